use dal_core::cache::{TTL_MISSING, TTL_PERSISTENT};
use dal_core::{CacheConfig, CacheError, CacheService, Cacheable, KvConnection, MemoryKvStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
    user: String,
    scopes: Vec<String>,
}

impl Cacheable for Session {
    const TYPE_TAG: &'static str = "session";
}

fn cache() -> CacheService<MemoryKvStore> {
    CacheService::new(MemoryKvStore::new())
}

#[test]
fn raw_save_and_get_with_and_without_ttl() {
    let cache = cache();
    cache.save("greeting", "hello", 0).unwrap();
    cache.save("token", "abc", 5).unwrap();

    assert_eq!(cache.get("greeting").unwrap(), Some("hello".to_string()));
    assert_eq!(cache.ttl("greeting").unwrap(), TTL_PERSISTENT);
    assert_eq!(cache.ttl("token").unwrap(), 5);

    cache.connection().advance(Duration::from_secs(5));
    assert_eq!(cache.get("token").unwrap(), None);
    assert_eq!(cache.ttl("token").unwrap(), TTL_MISSING);
}

#[test]
fn negative_ttl_means_no_expiry() {
    let cache = cache();
    cache.save("k", "v", -10).unwrap();
    assert_eq!(cache.ttl("k").unwrap(), TTL_PERSISTENT);
}

#[test]
fn typed_values_round_trip_and_expire() {
    let cache = cache();
    let session = Session {
        user: "ada".to_string(),
        scopes: vec!["read".to_string()],
    };

    cache.save_value("s:1", Some(&session), 60).unwrap();
    assert_eq!(cache.get_value::<Session>("s:1").unwrap(), Some(session));
    let ttl = cache.ttl("s:1").unwrap();
    assert!(ttl > 0 && ttl <= 60);

    assert_eq!(cache.get_value::<Session>("s:missing").unwrap(), None);
}

#[test]
fn typed_read_with_wrong_type_is_an_error_not_absent() {
    let cache = cache();
    cache.save_value("n", Some(&7_i64), 0).unwrap();

    let err = cache.get_value::<Session>("n").unwrap_err();
    assert!(matches!(err, CacheError::Serialization(_)));

    cache.save("plain", "not an envelope", 0).unwrap();
    assert!(matches!(
        cache.get_value::<String>("plain"),
        Err(CacheError::Serialization(_))
    ));
}

#[test]
fn saving_none_stores_empty_value_read_back_as_none() {
    let cache = cache();
    cache.save_value::<Session>("gone", None, 0).unwrap();

    assert!(cache.exists("gone").unwrap());
    assert_eq!(cache.get_value::<Session>("gone").unwrap(), None);
}

#[test]
fn save_if_absent_only_writes_once() {
    let cache = cache();

    assert!(cache.save_if_absent("lock", "owner-a").unwrap());
    assert!(!cache.save_if_absent("lock", "owner-b").unwrap());
    assert_eq!(cache.get("lock").unwrap(), Some("owner-a".to_string()));

    assert!(cache.save_value_if_absent("cfg", Some(&true)).unwrap());
    assert!(!cache.save_value_if_absent("cfg", Some(&false)).unwrap());
    assert_eq!(cache.get_value::<bool>("cfg").unwrap(), Some(true));
}

#[test]
fn delete_exists_and_expire() {
    let cache = cache();
    cache.save("k", "v", 0).unwrap();

    assert!(cache.exists("k").unwrap());
    assert!(cache.expire("k", 10).unwrap());
    assert_eq!(cache.ttl("k").unwrap(), 10);
    assert_eq!(cache.delete("k").unwrap(), 1);
    assert_eq!(cache.delete("k").unwrap(), 0);
    assert!(!cache.exists("k").unwrap());
    assert!(!cache.expire("k", 10).unwrap());
}

#[test]
fn increment_treats_absent_as_zero() {
    let cache = cache();

    assert_eq!(cache.increment("fresh", 4).unwrap(), 4);
    cache.save("five", "5", 0).unwrap();
    assert_eq!(cache.increment("five", 3).unwrap(), 8);
    assert_eq!(cache.increment("five", -10).unwrap(), -2);

    cache.save("word", "five", 0).unwrap();
    assert!(matches!(
        cache.increment("word", 1),
        Err(CacheError::NotInteger(_))
    ));
}

#[test]
fn concurrent_increments_are_not_lost() {
    let cache = Arc::new(cache());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..100 {
                    cache.increment("hits", 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.get("hits").unwrap(), Some("800".to_string()));
}

#[test]
fn set_helpers() {
    let cache = cache();

    assert_eq!(cache.add_to_set("tags", &["a", "b", "a"]).unwrap(), 2);
    assert!(cache.exist_in_set("tags", "a").unwrap());
    assert!(!cache.exist_in_set("tags", "z").unwrap());

    let mut popped = vec![
        cache.pop_from_set("tags").unwrap().unwrap(),
        cache.pop_from_set("tags").unwrap().unwrap(),
    ];
    popped.sort();
    assert_eq!(popped, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(cache.pop_from_set("tags").unwrap(), None);

    assert_eq!(cache.add_to_set_with_ttl("seen", 30, &["x"]).unwrap(), 1);
    assert_eq!(cache.ttl("seen").unwrap(), 30);
}

#[test]
fn list_helpers() {
    let cache = cache();

    assert_eq!(cache.push_to_list("queue", &["a", "b"]).unwrap(), 2);
    assert_eq!(cache.push_to_list("queue", &["c"]).unwrap(), 3);

    assert_eq!(cache.list("queue").unwrap(), vec!["a", "b", "c"]);
    assert_eq!(cache.list_range("queue", 1, -1).unwrap(), vec!["b", "c"]);
    assert_eq!(cache.list_range("queue", -1, -1).unwrap(), vec!["c"]);
    assert!(cache.list_range("queue", 5, 10).unwrap().is_empty());
    assert!(cache.list("nothing").unwrap().is_empty());
}

#[test]
fn wrong_kind_is_reported() {
    let cache = cache();
    cache.push_to_list("queue", &["a"]).unwrap();

    assert!(matches!(cache.get("queue"), Err(CacheError::WrongType(_))));
    assert!(matches!(
        cache.add_to_set("queue", &["x"]),
        Err(CacheError::WrongType(_))
    ));
}

#[test]
fn configured_prefix_and_type_property_are_used() {
    let config = CacheConfig {
        key_prefix: "svc:".to_string(),
        type_property: "kind".to_string(),
        default_ttl_seconds: 0,
    };
    let cache = CacheService::from_config(MemoryKvStore::new(), &config).unwrap();
    cache.save_value("answer", Some(&42_u64), 0).unwrap();

    let raw = cache.get("answer").unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["kind"], "u64");
    assert_eq!(json["value"], 42);
    assert!(cache.connection().exists(b"svc:answer").unwrap());
}

#[test]
fn huge_ttl_is_reported_as_command_error() {
    let cache = cache();
    cache.save("k", "v", 0).unwrap();

    assert!(matches!(
        cache.expire("k", i64::MAX),
        Err(CacheError::Command(_))
    ));
    assert!(matches!(
        cache.save("k2", "v", i64::MAX),
        Err(CacheError::Command(_))
    ));
    assert_eq!(cache.get("k").unwrap(), Some("v".to_string()));
    assert!(!cache.exists("k2").unwrap());
}

#[test]
fn type_property_colliding_with_payload_is_refused() {
    let config = CacheConfig {
        type_property: "value".to_string(),
        ..CacheConfig::default()
    };
    let err = CacheService::from_config(MemoryKvStore::new(), &config).unwrap_err();
    assert!(matches!(err, CacheError::Serialization(_)));
}

#[test]
fn non_finite_float_is_not_written() {
    let cache = cache();

    let err = cache.save_value("ratio", Some(&f64::NAN), 0).unwrap_err();
    assert!(matches!(err, CacheError::Serialization(_)));
    assert!(!cache.exists("ratio").unwrap());
}
