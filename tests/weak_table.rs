use moonlet::errors::RuntimeError;
use moonlet::runtime::{IntoValue, Runtime, TableRef, UserdataRef, Value};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
struct MyData(i32);

fn make_weak(rt: &Arc<Runtime>, mode: &str) -> Result<TableRef, RuntimeError> {
    let t = rt.create_table();
    let mt = rt.create_table();
    mt.raw_set("__mode", mode, rt)?;
    t.set_metatable(Some(&mt), rt)?;
    Ok(t)
}

#[test]
fn weak_values_drop_with_their_referents() {
    let rt = Runtime::new();
    let t = make_weak(&rt, "v").unwrap();

    let table_value = rt.create_table();
    let userdata_value = rt.create_userdata(MyData(1));
    let array_value = rt.create_table();

    t.raw_set("table", &table_value, &rt).unwrap();
    t.raw_set("userdata", userdata_value.clone(), &rt).unwrap();
    t.raw_set("string", "this is a test", &rt).unwrap();
    t.raw_set(1, &array_value, &rt).unwrap();

    assert!(t.hash_length() >= 3);
    assert_eq!(t.array_length(), 1);

    // strong references exist, everything is reachable; scoped so the
    // results do not pin the referents themselves
    {
        let got: Value = t.raw_get("table", &rt).unwrap();
        assert_eq!(got, Value::Table(table_value.clone()));
        let got: Value = t.raw_get(1, &rt).unwrap();
        assert_eq!(got, Value::Table(array_value.clone()));
    }

    drop(table_value);
    drop(userdata_value);
    drop(array_value);

    let got: Value = t.raw_get("table", &rt).unwrap();
    assert_eq!(got, Value::Nil);
    let got: Value = t.raw_get("userdata", &rt).unwrap();
    assert_eq!(got, Value::Nil);
    let got: Value = t.raw_get(1, &rt).unwrap();
    assert_eq!(got, Value::Nil);

    // strings are primitives and never weaken
    let got: Value = t.raw_get("string", &rt).unwrap();
    assert_eq!(got, "this is a test".into_value(&rt).unwrap());
}

#[test]
fn weak_keys_drop_their_entries() {
    let rt = Runtime::new();
    let t = make_weak(&rt, "k").unwrap();

    let key = rt.create_userdata(MyData(111));
    let value = rt.create_table();

    t.raw_set(key.clone(), &value, &rt).unwrap();
    let got: Value = t.raw_get(key.clone(), &rt).unwrap();
    assert_eq!(got, Value::Table(value.clone()));
    assert_eq!(t.key_count(), 1);

    drop(key);

    assert_eq!(t.key_count(), 0);
    assert_eq!(t.next(Value::Nil, &rt).unwrap(), None);

    // the value itself stays alive through our own handle
    assert_eq!(value.length(), 0);
}

#[test]
fn weak_both_prunes_during_enumeration() {
    let rt = Runtime::new();
    let t = make_weak(&rt, "kv").unwrap();

    let key1 = rt.create_userdata(MyData(111));
    let val1 = rt.create_userdata(MyData(222));
    let key2 = rt.create_userdata(MyData(333));
    let val2 = rt.create_userdata(MyData(444));
    let key3 = rt.create_userdata(MyData(555));
    let val3 = rt.create_userdata(MyData(666));

    t.raw_set(key1.clone(), val1.clone(), &rt).unwrap();
    t.raw_set(key2.clone(), val2.clone(), &rt).unwrap();
    t.raw_set(key3.clone(), val3.clone(), &rt).unwrap();

    drop(key2);
    drop(val2);

    let mut seen = 0;
    let mut cursor = Value::Nil;
    while let Some((key, _)) = t.next(cursor, &rt).unwrap() {
        seen += 1;
        cursor = key;
    }
    assert_eq!(seen, 2);
    assert_eq!(t.key_count(), 2);
}

#[test]
fn weak_entry_survives_replacement() {
    let rt = Runtime::new();
    let t = make_weak(&rt, "kv").unwrap();

    let key = rt.create_userdata(MyData(1));
    let old_value = rt.create_userdata(MyData(2));
    let new_value = rt.create_userdata(MyData(3));

    t.raw_set(key.clone(), old_value.clone(), &rt).unwrap();
    t.raw_set(key.clone(), new_value.clone(), &rt).unwrap();

    drop(old_value);

    let got: Value = t.raw_get(key.clone(), &rt).unwrap();
    assert_eq!(got, Value::Userdata(new_value));
}

#[test]
fn userdata_reboxes_while_host_survives() {
    let rt = Runtime::new();
    let t = make_weak(&rt, "v").unwrap();

    let host: Arc<MyData> = Arc::new(MyData(111));
    let boxed = rt.create_userdata_shared(host.clone(), None);

    t.raw_set("u", boxed.clone(), &rt).unwrap();
    drop(boxed);

    // the visible box died, but the host keeps the entry resurrectable
    let got: UserdataRef = t.raw_get("u", &rt).unwrap();
    assert_eq!(got.data::<MyData>(), Some(&MyData(111)));

    // a fresh box over the same host is the same userdata
    let same_host = rt.create_userdata_shared(host.clone(), None);
    assert_eq!(got, same_host);

    drop(got);
    drop(same_host);
    drop(host);

    let got: Value = t.raw_get("u", &rt).unwrap();
    assert_eq!(got, Value::Nil);
}

#[test]
fn rebox_keeps_the_metatable() {
    let rt = Runtime::new();
    let t = make_weak(&rt, "v").unwrap();

    let mt = rt.create_table();
    mt.raw_set("kind", "special", &rt).unwrap();

    let host: Arc<MyData> = Arc::new(MyData(5));
    let boxed = rt.create_userdata_shared(host.clone(), Some(&mt));

    t.raw_set("u", boxed.clone(), &rt).unwrap();
    drop(boxed);

    let got: UserdataRef = t.raw_get("u", &rt).unwrap();
    assert_eq!(got.get_metatable(), Some(mt));
}

#[test]
fn mode_change_rehashes_both_ways() {
    let rt = Runtime::new();
    let t = rt.create_table();

    let held = rt.create_table();
    t.raw_set("held", &held, &rt).unwrap();
    t.raw_set(1, &held, &rt).unwrap();

    // strong -> weak values
    let mt = rt.create_table();
    mt.raw_set("__mode", "v", &rt).unwrap();
    t.set_metatable(Some(&mt), &rt).unwrap();

    let other = rt.create_table();
    t.raw_set("other", &other, &rt).unwrap();
    drop(other);
    let got: Value = t.raw_get("other", &rt).unwrap();
    assert_eq!(got, Value::Nil);

    // weak -> strong again: surviving entries are pinned
    t.set_metatable(None, &rt).unwrap();
    t.raw_set("pinned", rt.create_table(), &rt).unwrap();
    let got: Value = t.raw_get("pinned", &rt).unwrap();
    assert!(matches!(got, Value::Table(_)));

    drop(held);
    let got: Value = t.raw_get("held", &rt).unwrap();
    assert!(matches!(got, Value::Table(_)));
    let got: Value = t.raw_get(1, &rt).unwrap();
    assert!(matches!(got, Value::Table(_)));
}

#[test]
fn dead_weak_array_cells_move_the_border() {
    let rt = Runtime::new();
    let t = make_weak(&rt, "v").unwrap();

    let first = rt.create_table();
    let second = rt.create_table();
    t.raw_set(1, &first, &rt).unwrap();
    t.raw_set(2, &second, &rt).unwrap();
    assert_eq!(t.length(), 2);

    drop(second);

    // the tail cell died, binary search finds the remaining border
    assert_eq!(t.length(), 1);
    let got: Value = t.raw_get(1, &rt).unwrap();
    assert_eq!(got, Value::Table(first));
}
