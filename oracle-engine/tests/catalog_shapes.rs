use std::collections::BTreeMap;
use std::hash::Hasher;

use oracle_engine::{Catalog, CompatSession, UserRecord, draw_spread};
use serde_json::{Map, Value, json};
use twox_hash::XxHash64;

const SNAPSHOT_HASH: u64 = 0xf439_5c51_fd3e_986a;

#[test]
fn catalog_and_pinned_draws_snapshot_stable() {
    let catalog = Catalog::default_catalog();
    let mut snapshot = BTreeMap::new();
    for spread in catalog.spreads() {
        let result = draw_spread(catalog.cards(), spread, "snapshot").unwrap();
        let value = json!({
            "cards": spread.card_count(),
            "positions": spread
                .positions
                .iter()
                .map(|position| position.name.clone())
                .collect::<Vec<_>>(),
            "draw": result
                .cards
                .iter()
                .map(|drawn| json!([drawn.card.id, drawn.is_reversed]))
                .collect::<Vec<_>>(),
        });
        snapshot.insert(format!("spread:{}", spread.id), canonicalize_value(value));
    }
    for topic in catalog.topics() {
        let value = json!({
            "name": topic.name,
            "requiresQuestion": topic.requires_question,
        });
        snapshot.insert(format!("topic:{}", topic.id), canonicalize_value(value));
    }
    let deck: Vec<Value> = catalog
        .cards()
        .iter()
        .map(|card| json!([card.id, card.element]))
        .collect();
    snapshot.insert("deck".to_string(), Value::Array(deck));
    snapshot.insert("hexagrams".to_string(), json!(catalog.hexagrams().len()));

    let canonical = serde_json::to_string_pretty(&snapshot).unwrap();
    let digest = snapshot_hash(canonical.as_bytes());
    assert_eq!(
        digest, SNAPSHOT_HASH,
        "catalog or draw snapshot changed\n{canonical}"
    );
}

#[test]
fn stored_records_keep_their_wire_names() {
    let now = chrono::DateTime::parse_from_rfc3339("2024-02-10T09:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let mut record = UserRecord::new(now, &oracle_engine::LedgerConfig::default());
    record.record_card_seen(3, now);
    let value = serde_json::to_value(&record).unwrap();
    for key in [
        "seenCards",
        "checkinDays",
        "checkinStreak",
        "totalReadings",
        "credits",
        "createdAt",
        "updatedAt",
    ] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    let restored: UserRecord = serde_json::from_value(value).unwrap();
    assert_eq!(restored, record);

    let party = oracle_engine::CompatParty {
        card_id: 7,
        is_reversed: true,
    };
    let session = CompatSession::open("QWER5678", "friend", "友谊合盘", party, now, 600);
    let value = serde_json::to_value(&session).unwrap();
    assert_eq!(value["code"], "QWER5678");
    assert_eq!(value["a"]["isReversed"], true);
    assert_eq!(value["expiresAt"], "2024-02-10T09:10:00Z");
}

fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut result = Map::with_capacity(entries.len());
            for (key, value) in entries {
                result.insert(key, canonicalize_value(value));
            }
            Value::Object(result)
        }
        other => other,
    }
}

fn snapshot_hash(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}
