use persisted::{
    Cancellable, DefaultValuePersistOption, InMemoryStorage, Persisted, PersistError, Persister,
    Storage, Transformer,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

type Strings = InMemoryStorage<String, String>;

#[derive(Debug, Error)]
#[error("stored value is corrupt")]
struct Corrupt;

/// Stores strings upper-cased and refuses to read anything back
struct WriteOnly;

impl Transformer for WriteOnly {
    type Input = String;
    type Output = String;
    type Error = Corrupt;

    fn transform(&self, value: String) -> Result<String, Corrupt> {
        Ok(value.to_uppercase())
    }

    fn untransform(&self, _value: String) -> Result<String, Corrupt> {
        Err(Corrupt)
    }
}

fn key() -> String {
    "k".to_string()
}

fn collect<V: Send + 'static>(
    persister: &Persister<V>,
) -> (Arc<Mutex<Vec<Result<V, PersistError>>>>, persisted::Subscription)
where
    V: Clone + Sync,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let subscription = persister.add_update_listener(move |update| {
        sink.lock().unwrap().push(update);
    });
    (seen, subscription)
}

#[test_log::test]
fn scenario_a_listener_sees_the_new_value() {
    let storage = Arc::new(Strings::new());
    let persister = Persister::new(key(), Arc::clone(&storage), String::new());

    persister.persist("a".to_string()).unwrap();
    let (seen, _subscription) = collect(&persister);
    persister.persist("b".to_string()).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].as_ref().unwrap(), "b");
    assert_eq!(persister.retrieve_value(), "b");
}

#[test_log::test]
fn scenario_b_default_is_not_written_without_persist_when_nil() {
    let storage = Arc::new(Strings::new());
    let persister = Persister::new(key(), Arc::clone(&storage), "default".to_string());

    assert_eq!(persister.retrieve_value(), "default");
    assert_eq!(storage.retrieve_value(&key()).unwrap(), None);
}

#[test_log::test]
fn scenario_c_persist_on_error_overwrites_with_transformed_default() {
    let storage = Arc::new(Strings::with_values([(key(), "garbage".to_string())]));
    let persister =
        Persister::with_transformer(key(), Arc::clone(&storage), WriteOnly, "default".to_string())
            .with_default_value_persist_behaviour(DefaultValuePersistOption::PERSIST_ON_ERROR);

    assert_eq!(persister.retrieve_value_or_throw().unwrap(), "default");
    assert_eq!(
        storage.retrieve_value(&key()).unwrap(),
        Some("DEFAULT".to_string())
    );
}

#[test_log::test]
fn scenario_c_without_persist_on_error() {
    let storage = Arc::new(Strings::with_values([(key(), "garbage".to_string())]));
    let persister =
        Persister::with_transformer(key(), Arc::clone(&storage), WriteOnly, "default".to_string());

    let error = persister.retrieve_value_or_throw().unwrap_err();
    assert!(
        error
            .transform_error()
            .and_then(|e| e.downcast_ref::<Corrupt>())
            .is_some()
    );

    assert_eq!(persister.retrieve_value(), "default");
    assert_eq!(
        storage.retrieve_value(&key()).unwrap(),
        Some("garbage".to_string())
    );
}

#[test_log::test]
fn persist_when_nil_stores_the_default_representation() {
    let storage = Arc::new(Strings::new());
    let persister =
        Persister::with_transformer(key(), Arc::clone(&storage), WriteOnly, "default".to_string())
            .with_default_value_persist_behaviour(
                DefaultValuePersistOption::PERSIST_WHEN_NIL
                    | DefaultValuePersistOption::PERSIST_ON_ERROR,
            );

    assert_eq!(persister.retrieve_value(), "default");
    assert_eq!(
        storage.retrieve_value(&key()).unwrap(),
        Some("DEFAULT".to_string())
    );
}

#[test_log::test]
fn each_subscriber_gets_exactly_one_notification_per_write() {
    let storage = Arc::new(Strings::new());
    let persister = Persister::new(key(), Arc::clone(&storage), String::new());
    let (first, _first) = collect(&persister);
    let (second, _second) = collect(&persister);
    let (cancelled, subscription) = collect(&persister);

    subscription.cancel();
    persister.persist("x".to_string()).unwrap();

    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 1);
    assert!(cancelled.lock().unwrap().is_empty());
}

#[test_log::test]
fn writes_to_one_key_do_not_notify_another() {
    let storage = Arc::new(Strings::new());
    let a = Persister::new("a".to_string(), Arc::clone(&storage), String::new());
    let b = Persister::new("b".to_string(), Arc::clone(&storage), String::new());
    let (seen_b, _subscription) = collect(&b);

    a.persist("value".to_string()).unwrap();
    a.remove_value().unwrap();

    assert!(seen_b.lock().unwrap().is_empty());
}

#[test_log::test]
fn listeners_distinguish_removal_from_unreadable_values() {
    let storage = Arc::new(Strings::new());
    let persister =
        Persister::with_transformer(key(), Arc::clone(&storage), WriteOnly, "default".to_string());
    let (seen, _subscription) = collect(&persister);

    storage.store_value("raw".to_string(), &key()).unwrap();
    storage.remove_value(&key()).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_err());
    assert_eq!(seen[1].as_ref().unwrap(), "default");
}

#[test_log::test]
fn changes_through_another_handle_are_reported() {
    let storage = Arc::new(Strings::new());
    let reader = Persisted::new(Persister::new(key(), Arc::clone(&storage), String::new()));
    let writer = Persisted::new(Persister::new(key(), Arc::clone(&storage), String::new()));
    let (seen, _subscription) = collect(reader.persister());

    writer.set("from elsewhere".to_string());

    assert_eq!(reader.get(), "from elsewhere");
    assert_eq!(seen.lock().unwrap()[0].as_ref().unwrap(), "from elsewhere");
}

#[test_log::test]
fn concurrent_writers_deliver_every_update() {
    let storage = Arc::new(InMemoryStorage::<String, usize>::new());
    let persister = Persister::new(key(), Arc::clone(&storage), 0);
    let received = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&received);
    let _subscription = persister.add_update_listener(move |update| {
        update.unwrap();
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handles: Vec<_> = (0..4)
        .map(|thread| {
            let persister = persister.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    persister.persist(thread * 100 + i).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(received.load(Ordering::SeqCst), 100);
}

#[test_log::test]
fn last_notification_matches_the_stored_value() {
    let storage = Arc::new(InMemoryStorage::<String, usize>::new());
    let persister = Persister::new(key(), Arc::clone(&storage), 0);
    let last = Arc::new(Mutex::new(None));

    let sink = Arc::clone(&last);
    let _subscription = persister.add_update_listener(move |update| {
        *sink.lock().unwrap() = Some(update.unwrap());
    });

    let handles: Vec<_> = (0..4)
        .map(|thread| {
            let persister = persister.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    persister.persist(thread * 1000 + i).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(*last.lock().unwrap(), Some(persister.retrieve_value()));
}
