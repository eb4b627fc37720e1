use std::thread::sleep;
use std::time::Duration;
use tempfile::TempDir;
use twinlog::index::now_millis;
use twinlog::{Result, Store, Value};

#[test]
fn expired_keys_read_as_absent() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Store::builder(temp.path())
        .sync_interval(Duration::from_secs(5))
        .build()?;

    let soon = now_millis() + 1_000;
    let later = now_millis() + 60_000;
    for i in 0..1000 {
        let expiration = if i % 2 == 0 { soon } else { later };
        store.set_with_expiration(i, i + 1, expiration)?;
        assert_eq!(store.get(i)?, Some(Value::from(i + 1)));
    }

    sleep(Duration::from_millis(1_100));

    let check = |store: &Store| -> Result<()> {
        for i in 0..1000 {
            if i % 2 == 0 {
                assert_eq!(store.get(i)?, None);
                assert!(!store.contains(i)?);
            } else {
                assert_eq!(store.get(i)?, Some(Value::from(i + 1)));
            }
        }
        Ok(())
    };

    check(&store)?;
    store.reclaim()?;
    check(&store)?;

    // Reclaim dropped the expired entries from the logs and carried the
    // expiration field for the survivors.
    store.reopen()?;
    check(&store)?;
    store.close()
}

#[test]
fn expiration_survives_reopen() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Store::open(temp.path())?;

    store.set_with_expiration("short", 1, now_millis() + 200)?;
    store.set_with_expiration("long", 2, now_millis() + 60_000)?;
    store.reopen()?;

    assert_eq!(store.get("short")?, Some(Value::from(1)));
    sleep(Duration::from_millis(300));
    assert_eq!(store.get("short")?, None);
    assert_eq!(store.get("long")?, Some(Value::from(2)));
    store.close()
}

#[test]
fn overwrite_clears_expiration() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Store::open(temp.path())?;

    store.set_with_expiration("key", 1, now_millis() + 200)?;
    store.set("key", 2)?;
    sleep(Duration::from_millis(300));
    assert_eq!(store.get("key")?, Some(Value::from(2)));
    store.close()
}
