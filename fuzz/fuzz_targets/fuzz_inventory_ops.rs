#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pathbind_core::{ObservableList, ObservableMap, Value};
use pathbind_runtime::{BindingInventory, CallbackElement};

#[derive(Debug, Arbitrary)]
enum Op {
    Track(String),
    Read(String),
    Write(String, i64),
    Insert(u8, i64),
    Remove(u8),
    Push(i64),
    Nest(u8),
    RefreshAll,
}

const KEYS: [&str; 4] = ["A", "B", "Items", "Child"];

fuzz_target!(|ops: Vec<Op>| {
    let model = ObservableMap::new();
    let items = ObservableList::new();
    model.insert("Items", Value::List(items.clone()));
    let inventory = BindingInventory::new();
    inventory.set_context_object(Value::Map(model.clone()));

    for op in ops.into_iter().take(64) {
        match op {
            Op::Track(path) => {
                let _ = inventory.track_element(CallbackElement::new(path, |_| {}));
            }
            Op::Read(path) => {
                let _ = inventory.dereference_value(&path);
                let _ = inventory.dereference_property_type(&path);
            }
            Op::Write(path, v) => {
                let _ = inventory.send_update(&path, Value::Int(v));
            }
            Op::Insert(key, v) => {
                model.insert(KEYS[usize::from(key) % KEYS.len()], Value::Int(v));
            }
            Op::Remove(key) => {
                model.remove(KEYS[usize::from(key) % KEYS.len()]);
            }
            Op::Push(v) => items.push(Value::Int(v)),
            Op::Nest(key) => {
                let child = ObservableMap::new();
                child.insert("A", Value::Int(0));
                model.insert(KEYS[usize::from(key) % KEYS.len()], Value::Map(child));
            }
            Op::RefreshAll => inventory.refresh_all(),
        }
    }
});
