//! End-to-end auto-match and cache behaviour

mod common;

use std::sync::Arc;

use common::{fixture_source, load_shop, Encoder};
use proptest::prelude::*;
use protolens::{
    auto_cache_key, Decoder, DecoderConfig, Direction, MatchSource, SchemaRegistry, SchemaSource,
    TypeMapping,
};

fn user_decoder() -> Decoder {
    let registry = Arc::new(SchemaRegistry::new());
    registry.add_source(fixture_source("user.proto")).unwrap();
    Decoder::new(registry)
}

fn user_bytes() -> Vec<u8> {
    Encoder::new()
        .int(1, 7)
        .string(2, "Ann")
        .string(3, "ann@example.com")
        .finish()
}

#[test]
fn test_user_response_beats_empty() {
    let decoder = user_decoder();
    let found = decoder.auto_match_decode(&user_bytes()).unwrap();
    assert_eq!(found.type_name, "UserResponse");
    assert_eq!(found.decoded.value["name"], "Ann");
    assert_eq!(found.decoded.value["email"], "ann@example.com");
}

#[test]
fn test_no_candidate_for_empty_only_registry() {
    let registry = Arc::new(SchemaRegistry::new());
    registry
        .add_source(SchemaSource::with_id("e", "e.proto", "message Empty {}"))
        .unwrap();
    let decoder = Decoder::new(registry);
    assert!(decoder.auto_match_decode(&user_bytes()).is_none());
}

#[test]
fn test_nested_shapes_score_higher() {
    let registry = Arc::new(SchemaRegistry::new());
    load_shop(&registry);
    let decoder = Decoder::new(registry);

    let item = Encoder::new().string(1, "sku-1").uint(2, 3).uint(3, 2);
    let bytes = Encoder::new()
        .int(1, 1001)
        .uint(2, 2)
        .message(3, item)
        .message(4, Encoder::new().string(1, "gift").string(2, "yes"))
        .string(10, "a@b.c")
        .finish();

    let found = decoder.auto_match_decode(&bytes).unwrap();
    assert_eq!(found.type_name, "shop.Order");
    let value = &found.decoded.value;
    assert_eq!(value["status"], "SHIPPED");
    assert_eq!(value["items"][0]["payment"], "PAID");
    assert_eq!(value["labels"]["gift"], "yes");
    assert_eq!(value["email"], "a@b.c");
}

#[test]
fn test_try_auto_match_caches_by_path() {
    let decoder = user_decoder();
    let bytes = user_bytes();

    let first = decoder
        .try_auto_match(&bytes, "https://api.example.com/users?id=1", Direction::Response)
        .unwrap();
    assert!(!first.cached);
    assert_eq!(
        decoder
            .cache()
            .get(&auto_cache_key("https://api.example.com/users", Direction::Response), decoder.registry().generation())
            .as_deref(),
        Some("UserResponse")
    );

    let second = decoder
        .try_auto_match(&bytes, "https://api.example.com/users?id=2", Direction::Response)
        .unwrap();
    assert!(second.cached);

    // the request direction has its own slot
    let request = decoder
        .try_auto_match(&bytes, "https://api.example.com/users", Direction::Request)
        .unwrap();
    assert!(!request.cached);
    assert_eq!(decoder.cache().len(), 2);
}

#[test]
fn test_clear_then_rematch_after_shape_change() {
    let registry = Arc::new(SchemaRegistry::new());
    registry
        .add_source(SchemaSource::with_id(
            "s",
            "people.proto",
            "message Profile { string name = 1; string email = 2; } message Ping { int32 seq = 1; }",
        ))
        .unwrap();
    let decoder = Decoder::new(Arc::clone(&registry));
    let bytes = Encoder::new().string(1, "Ann").string(2, "ann@example.com").finish();
    let url = "https://h/people/1";

    let first = decoder.try_auto_match(&bytes, url, Direction::Response).unwrap();
    assert_eq!(first.type_name, "Profile");

    registry.remove_source("s").unwrap();
    registry
        .add_source(SchemaSource::with_id(
            "s",
            "people.proto",
            "message Profile { int32 id = 1; int32 age = 2; } message Contact { string name = 1; string email = 2; }",
        ))
        .unwrap();

    decoder.clear_auto_cache();
    assert!(decoder.cache().is_empty());

    let again = decoder.try_auto_match(&bytes, url, Direction::Response).unwrap();
    assert!(!again.cached);
    assert_eq!(again.type_name, "Contact");
}

#[test]
fn test_new_generation_invalidates_cache() {
    let decoder = user_decoder();
    let bytes = user_bytes();
    decoder.try_auto_match(&bytes, "https://h/u", Direction::Response).unwrap();

    decoder
        .registry()
        .add_source(SchemaSource::with_id("x", "x.proto", "message Other { int32 id = 1; }"))
        .unwrap();
    let next = decoder.try_auto_match(&bytes, "https://h/u", Direction::Response).unwrap();
    assert!(!next.cached);
    assert_eq!(next.type_name, "UserResponse");
}

#[test]
fn test_decode_for_url_mapping_then_scan() {
    let decoder = user_decoder();
    decoder
        .registry()
        .add_mapping(TypeMapping::new("https://h/empty/*", "Empty", Direction::Request))
        .unwrap();

    let (decoded, source) = decoder
        .decode_for_url(&user_bytes(), "https://h/empty/1", Direction::Request)
        .unwrap()
        .unwrap();
    assert_eq!(source, MatchSource::Mapping);
    assert_eq!(decoded.type_name, "Empty");
    assert_eq!(decoded.stats.unknown_fields, 3);

    let (decoded, source) = decoder
        .decode_for_url(&user_bytes(), "https://h/empty/1", Direction::Response)
        .unwrap()
        .unwrap();
    assert_eq!(source, MatchSource::Scan);
    assert_eq!(decoded.type_name, "UserResponse");
}

// =============================================================================
// Cached type that stops decoding
// =============================================================================

/// Decoder whose depth limit a three-level `Node` payload exceeds
fn shallow_decoder(text: &str) -> Decoder {
    let registry = Arc::new(SchemaRegistry::new());
    registry
        .add_source(SchemaSource::with_id("n", "nodes.proto", text))
        .unwrap();
    let config = DecoderConfig {
        max_depth: 1,
        ..DecoderConfig::default()
    };
    Decoder::with_config(registry, config)
}

fn deep_node_bytes() -> Vec<u8> {
    let leaf = Encoder::new().uint(2, 1);
    let mid = Encoder::new().message(1, leaf);
    let top = Encoder::new().message(1, mid);
    Encoder::new().message(1, top).uint(2, 9).finish()
}

#[test]
fn test_failing_cached_type_falls_back_to_scan() {
    let decoder = shallow_decoder(
        "message Node { Node child = 1; int32 v = 2; } message Flat { bytes child = 1; int32 v = 2; }",
    );
    let url = "https://h/tree";
    let key = auto_cache_key(url, Direction::Response);
    let generation = decoder.registry().generation();
    decoder.cache().insert(key.clone(), "Node", generation);

    let found = decoder
        .try_auto_match(&deep_node_bytes(), url, Direction::Response)
        .unwrap();
    assert!(!found.cached);
    assert_eq!(found.type_name, "Flat");
    assert_eq!(found.decoded.value["v"], 9);
    assert_eq!(decoder.cache().get(&key, generation).as_deref(), Some("Flat"));
}

#[test]
fn test_failing_cached_type_with_no_alternative_is_dropped() {
    let decoder = shallow_decoder("message Node { Node child = 1; int32 v = 2; }");
    let url = "https://h/tree";
    let key = auto_cache_key(url, Direction::Response);
    let generation = decoder.registry().generation();
    decoder.cache().insert(key.clone(), "Node", generation);

    assert!(decoder
        .try_auto_match(&deep_node_bytes(), url, Direction::Response)
        .is_none());
    assert!(decoder.cache().get(&key, generation).is_none());

    // shallow payloads still match and repopulate the entry
    let shallow = Encoder::new().uint(2, 3).finish();
    let found = decoder.try_auto_match(&shallow, url, Direction::Response).unwrap();
    assert_eq!(found.type_name, "Node");
    assert_eq!(decoder.cache().get(&key, generation).as_deref(), Some("Node"));
}

#[test]
fn test_nested_group_flood_is_no_match() {
    let registry = Arc::new(SchemaRegistry::new());
    registry
        .add_source(SchemaSource::with_id("u", "u.proto", "message U { int32 id = 1; }"))
        .unwrap();
    let decoder = Decoder::new(registry);
    assert!(decoder.auto_match_decode(&vec![0x0b; 200_000]).is_none());
    assert!(decoder.decode_named("U", &vec![0x0b; 200_000]).is_err());
}

proptest! {
    #[test]
    fn prop_cache_key_drops_query(
        host in "[a-z]{1,8}(\\.[a-z]{2,4})?",
        path in "(/[a-zA-Z0-9_-]{1,6}){0,4}",
        query in "[a-z0-9=&]{0,12}",
        response in any::<bool>(),
    ) {
        let direction = if response { Direction::Response } else { Direction::Request };
        let base = format!("https://{}{}", host, path);
        let key = auto_cache_key(&format!("{}?{}", base, query), direction);
        prop_assert_eq!(&key, &format!("{}:{}", direction, base));
        prop_assert_eq!(key, auto_cache_key(&base, direction));
    }

    #[test]
    fn prop_populated_user_never_matches_empty(
        id in 1i64..1_000_000,
        name in "[a-zA-Z ]{0,12}",
        email in proptest::option::of("[a-z]{1,8}@[a-z]{1,8}\\.com"),
    ) {
        let decoder = user_decoder();
        let mut encoder = Encoder::new().int(1, id);
        if !name.is_empty() {
            encoder = encoder.string(2, &name);
        }
        if let Some(email) = &email {
            encoder = encoder.string(3, email);
        }
        let found = decoder.auto_match_decode(&encoder.finish()).unwrap();
        prop_assert_eq!(found.type_name, "UserResponse");
    }
}
