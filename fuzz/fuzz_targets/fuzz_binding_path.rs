#![no_main]

use libfuzzer_sys::fuzz_target;
use pathbind_runtime::BindingPath;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(path) = BindingPath::parse(text) {
        // Accepted paths print back to the same path.
        let reparsed = BindingPath::parse(&path.to_string()).expect("display output must parse");
        assert_eq!(reparsed, path);
        // The canonical key is itself a path with the same key.
        let canonical = BindingPath::parse(path.key()).expect("key must parse");
        assert_eq!(canonical.key(), path.key());
        let _ = path.is_affected_by(Some(path.relative()));
    }
});
