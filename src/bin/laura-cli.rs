//! Minimal test harness around `Database`: `ingest <file>`, `query <json>`,
//! `explain <json>`. Not a supported client surface, see §6.

use std::path::PathBuf;

use laura_db::core::config::Config;
use laura_db::core::database::Database;
use laura_db::core::value::{Document, Value};
use laura_db::query::executor::QueryOptions;
use laura_db::query::filter::Filter;

fn doc_from_json(v: serde_json::Value) -> Document {
    let mut doc = Document::new();
    if let Value::Map(map) = Value::from_json(v) {
        for (k, v) in map.iter() {
            doc.set(k, v.clone());
        }
    }
    doc
}

fn doc_to_json(doc: &Document) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for (field, value) in doc.iter() {
        obj.insert(field.to_string(), value.to_json());
    }
    serde_json::Value::Object(obj)
}

fn open_db() -> Database {
    let storage_path = std::env::var("LAURA_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./laura-data"));
    let config = Config { storage_path, ..Config::default() };
    Database::open(config).expect("failed to open database")
}

fn cmd_ingest(path: &str) {
    let raw = std::fs::read_to_string(path).expect("failed to read ingest file");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("ingest file is not valid JSON");
    let docs = match parsed {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let db = open_db();
    let mut count = 0;
    for item in docs {
        let doc = doc_from_json(item);
        let id = db.insert(doc).expect("insert failed");
        println!("inserted {id}");
        count += 1;
    }
    db.flush().expect("flush failed");
    println!("ingested {count} documents");
}

fn cmd_query(json: &str) {
    let parsed: serde_json::Value = serde_json::from_str(json).expect("query is not valid JSON");
    let filter = Filter::parse(&parsed).expect("invalid filter");

    let db = open_db();
    let results = db.find(&filter, None, &QueryOptions::default()).expect("query failed");
    let out: Vec<serde_json::Value> = results.iter().map(doc_to_json).collect();
    println!("{}", serde_json::to_string_pretty(&out).unwrap());
}

fn cmd_explain(json: &str) {
    let parsed: serde_json::Value = serde_json::from_str(json).expect("query is not valid JSON");
    let filter = Filter::parse(&parsed).expect("invalid filter");

    let db = open_db();
    let plan = db.explain(&filter, None);
    println!("{plan:#?}");
}

fn main() {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_default();
    let arg = args.next();

    match (command.as_str(), arg) {
        ("ingest", Some(path)) => cmd_ingest(&path),
        ("query", Some(json)) => cmd_query(&json),
        ("explain", Some(json)) => cmd_explain(&json),
        _ => {
            eprintln!("usage: laura-cli <ingest <file> | query <json> | explain <json>>");
            std::process::exit(1);
        }
    }
}
