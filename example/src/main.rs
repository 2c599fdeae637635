use kv::error::{CResult, Error};
use kv::store::VersionedStore;
use serde_json::json;

fn main() {
    println!("Hello, kv!");

    run().unwrap();

    println!("Bye~");
}

fn run() -> CResult<()> {
    let store = VersionedStore::new();

    store.set("b", json!(0x01))?;
    store.set("b", json!(0x02))?;

    store.set("e", json!(0x05))?;
    store.delete("e");

    store.set("c", json!(0x00))?;
    store.delete("c");
    store.set("c", json!(0x03))?;

    match store.set("", json!(null)) {
        Err(Error::EmptyKey) => {}
        _ => panic!("expected empty key to be rejected"),
    }

    store.set("a", json!(0x01))?;

    store.delete("f");

    store.delete("d");
    store.set("d", json!(0x04))?;

    let mut keys = store.keys();
    keys.sort();
    assert_eq!(keys, vec!["a", "b", "c", "d"]);
    assert_eq!(store.get("c").unwrap().value, json!(0x03));

    Ok(())
}
