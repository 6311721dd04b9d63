//! Integration tests for the almanac extraction engine

use almanac::{
    aggregate_year_series, extract, normalize, parse_value, split, EngineConfig, EntityParser,
    ExtractOptions, FieldNode, FieldOutcome, Handler, HandlerError, NdjsonWriter, RecordWriter,
    RunSummary, SplitOptions,
};
use serde_json::{json, Value as JsonValue};
use std::io::Write;

const PLAN: &str = r#"
aggregate_entity: World
fields:
  - name: exports
    path: Economy.Exports
    handler: year_series
  - name: revenues
    path: Economy.Budget.revenues
    handler: value
    default: null
  - name: agriculture
    path: Economy.Agricultural products
    handler: list
    default: []
  - name: debt
    path: Economy.Public debt
    handler: fragile
  - name: area
    path: Geography.Area
    handler: subfields
"#;

fn country(exports_2023: &str) -> JsonValue {
    json!({
        "Economy": {
            "Exports": {
                "Exports 2023": {"text": exports_2023},
                "Exports 2022": {"text": "$1.1 trillion (2022 est.)"},
                "note": "balance of payments &amp; trade"
            },
            "Agricultural products": {
                "text": "fruits and vegetables (grown in oases); camels, sheep, goats (kept by nomads); fish"
            },
            "Public debt": {"text": "112% of GDP (2023 est.)"}
        },
        "Geography": {
            "Area": {
                "total": {"text": "643,801 sq km"},
                "land": {"text": "640,427 sq km"},
                "comparison": {"text": "slightly more than four times the size of Georgia"}
            }
        }
    })
}

fn parser() -> EntityParser {
    let config = EngineConfig::from_yaml_str(PLAN).unwrap();
    let mut registry = config.builtin_registry();
    registry.register("fragile", |node: &FieldNode, entity_id: &str| {
        if entity_id == "FR" {
            return Err(HandlerError::InvalidShape("unexpected layout".to_string()));
        }
        Ok(json!(node.text_trimmed()))
    });
    EntityParser::new(config, registry).unwrap()
}

#[test]
fn test_scaled_currency_with_estimate() {
    for (text, expected) in [
        ("$1.2 trillion (2023 est.)", 1.2e12),
        ("$45 billion (2021 est.)", 45e9),
        ("$3.5 million (2019 est.)", 3.5e6),
    ] {
        let parsed = parse_value(text);
        assert_eq!(parsed.value, Some(expected), "{}", text);
        assert!(parsed.year.is_some());
        assert!(parsed.is_estimate);
    }
}

#[test]
fn test_na_is_unavailable_not_zero() {
    for text in ["NA", "na", "  Na  "] {
        let parsed = parse_value(text);
        assert!(parsed.is_unavailable);
        assert_eq!(parsed.value, None);
    }
}

#[test]
fn test_split_respects_parentheses() {
    let items = split(
        "fruits and vegetables (grown in oases); camels, sheep, goats (kept by nomads); fish",
        &SplitOptions::default(),
    );
    assert_eq!(
        items,
        vec![
            "fruits and vegetables (grown in oases)",
            "camels, sheep, goats (kept by nomads)",
            "fish",
        ]
    );
}

#[test]
fn test_normalize_idempotent() {
    for s in [
        "&lt;p&gt;Hello&lt;/p&gt;  world",
        "\u{201c}x\u{201d} \u{2013} y",
        "a\r\n\r\n  b\t\tc",
        "&amp;amp;&amp;lt;",
    ] {
        let once = normalize(s);
        assert_eq!(normalize(&once), once);
    }
}

#[test]
fn test_year_series_example() {
    let node = FieldNode::from_json(&json!({
        "Exports 2023": {"text": "$1.2 trillion (2023 est.)"},
        "Exports 2022": {"text": "$1.1 trillion (2022 est.)"},
        "note": "balance of payments"
    }));

    let (series, note) = aggregate_year_series(&node);
    let years: Vec<i32> = series.data.iter().map(|entry| entry.year).collect();

    assert_eq!(years, vec![2023, 2022]);
    assert_eq!(series.latest_value, Some(1.2e12));
    assert_eq!(series.latest_year, Some(2023));
    assert_eq!(note.as_deref(), Some("balance of payments"));
}

#[test]
fn test_missing_path_returns_default() {
    let root = FieldNode::from_json(&json!({"Economy": {"Exports": {"text": "x"}}}));
    let handler = Handler::data_only("unreachable", |_node: &FieldNode| -> Result<JsonValue, HandlerError> {
        panic!("handler must not run for a missing field")
    });
    let options = ExtractOptions::default().with_default(json!({"value": null}));

    let extraction = extract(&root, "Economy.Budget.revenues", &handler, &options, "FR");

    assert_eq!(extraction.outcome, FieldOutcome::Missing);
    assert_eq!(extraction.value, json!({"value": null}));
}

#[test]
fn test_handler_failure_isolated_and_recorded_once() {
    let parser = parser();
    let mut summary = RunSummary::new();

    let records: Vec<_> = ["DE", "FR", "IT"]
        .iter()
        .map(|id| parser.parse_json(id, &country("$1.2 trillion (2023 est.)")))
        .collect();
    for record in &records {
        summary.absorb(&record.report);
    }

    for record in &records {
        assert_eq!(record.get("exports").unwrap()["latest_year"], json!(2023));
        assert_eq!(record.get("agriculture").unwrap().as_array().unwrap().len(), 3);
        assert_eq!(record.get("revenues"), Some(&JsonValue::Null));
    }

    let fr = &records[1];
    assert_eq!(fr.get("debt"), Some(&json!({})));
    assert!(matches!(fr.report.outcome("debt"), Some(FieldOutcome::Failed { .. })));
    assert_eq!(records[0].get("debt"), Some(&json!("112% of GDP (2023 est.)")));

    assert_eq!(summary.entities, 3);
    assert_eq!(summary.total_failures(), 1);
    assert_eq!(summary.failures[0].entity_id, "FR");
    assert_eq!(summary.failures[0].field, "debt");
    assert_eq!(summary.tally("debt").unwrap().extracted, 2);
    assert_eq!(summary.tally("revenues").unwrap().missing, 3);
}

#[test]
fn test_subfields_mix_values_and_text() {
    let record = parser().parse_json("DE", &country("$1.2 trillion (2023 est.)"));
    let area = record.get("area").unwrap();

    assert_eq!(area["total"]["value"], json!(643801.0));
    assert_eq!(area["total"]["unit"], json!("sq km"));
    assert_eq!(
        area["comparison"],
        json!("slightly more than four times the size of Georgia")
    );
}

#[test]
fn test_config_file_and_ndjson_output() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PLAN.as_bytes()).unwrap();
    let config = EngineConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.fields.len(), 5);

    // "fragile" is not a built-in handler
    assert!(EntityParser::with_builtins(config).is_err());

    let parser = parser();
    let mut buf = Vec::new();
    let mut writer = NdjsonWriter::new(&mut buf);
    writer
        .write_record(&parser.parse_json("DE", &country("NA")))
        .unwrap();
    writer.finish().unwrap();

    let line: JsonValue = serde_json::from_slice(&buf).unwrap();
    assert_eq!(line["entity_id"], json!("DE"));
    assert_eq!(line["exports"]["data"][0]["year"], json!(2023));
    assert_eq!(line["exports"]["data"][0]["value"], JsonValue::Null);
    assert_eq!(line["exports"]["latest_value"], JsonValue::Null);
    assert_eq!(line["exports"]["note"], json!("balance of payments & trade"));
}
