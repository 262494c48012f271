//! JNI-style name mangling, used as the lookup key for native peers.

use core::fmt::Write;

/// Mangle a name using the JNI escape rules.
pub fn mangle(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    for c in name.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => out.push(c),
            '/' | '.' => out.push('_'),
            '_' => out.push_str("_1"),
            ';' => out.push_str("_2"),
            '[' => out.push_str("_3"),
            _ => {
                let _ = write!(out, "_0{:04x}", c as u32);
            }
        }
    }
    out
}

/// `Java_<class>_<name>__<args>`; the class and argument parts are optional.
pub fn mangled_method_name(class: Option<&str>, name: &str, signature: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(class) = class {
        out.push_str("Java_");
        out.push_str(&mangle(class));
        out.push('_');
    }
    out.push_str(&mangle(name));
    if let Some(sig) = signature {
        let args = sig
            .strip_prefix('(')
            .and_then(|s| s.split_once(')'))
            .map(|(args, _)| args)
            .unwrap_or("");
        out.push_str("__");
        out.push_str(&mangle(args));
    }
    out
}
