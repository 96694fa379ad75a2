//! Embedded runtime C sources spliced verbatim into generated output.
//!
//! These files are never parsed or type-checked by the compiler; they are
//! copied byte-for-byte into the translation unit the code generator emits,
//! in the fixed order the language defines.

/// `cz_string` and the handful of operations generated code calls directly.
pub const STRING: &str = include_str!("runtime/string.c");

/// Generic-dispatch logging (`cz_log`) used by the `log` statement.
pub const FMT: &str = include_str!("runtime/fmt.c");

/// Thin OS shims: environment, process exit, line input.
pub const OS: &str = include_str!("runtime/os.c");

/// `default` allocator: a direct `malloc` passthrough.
pub const ALLOCATOR_DEFAULT: &str = include_str!("runtime/allocator_default.c");

/// `debug` allocator: routes through the byte/allocation counters the
/// generator emits ahead of the runtime splice.
pub const ALLOCATOR_DEBUG: &str = include_str!("runtime/allocator_debug.c");

/// `arena` allocator: bump-pointer allocation out of a fixed static buffer,
/// plus the allocator-agnostic `cz_heap_dup`/`cz_array_new`/`cz_map_new`.
pub const ALLOCATOR_ARENA: &str = include_str!("runtime/allocator_arena.c");

/// Monotonic clock reading, backing the standard library's timing helpers.
pub const CLOCK: &str = include_str!("runtime/clock.c");

/// Stackful coroutine scaffold. Prototype: POSIX-only, no scheduler.
pub const COROUTINES_PROTOTYPE: &str = include_str!("runtime/coroutines_prototype.c");

/// Every embedded file in the order the code generator splices them.
pub fn files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("string.c", STRING),
        ("fmt.c", FMT),
        ("os.c", OS),
        ("allocator_default.c", ALLOCATOR_DEFAULT),
        ("allocator_debug.c", ALLOCATOR_DEBUG),
        ("allocator_arena.c", ALLOCATOR_ARENA),
        ("clock.c", CLOCK),
        ("coroutines_prototype.c", COROUTINES_PROTOTYPE),
    ]
}

/// Joins every runtime file into the single verbatim block the generator
/// splices in after the type declarations and allocator macro selection.
pub fn splice() -> String {
    files().into_iter().map(|(_, src)| src).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_runtime_file_is_non_empty() {
        for (name, src) in files() {
            assert!(!src.trim().is_empty(), "{name} should not be empty");
        }
    }

    #[test]
    fn splice_preserves_file_order() {
        let spliced = splice();
        let string_at = spliced.find("cz_string_from_cstr").unwrap();
        let fmt_at = spliced.find("cz_log_i64").unwrap();
        let alloc_at = spliced.find("CZ_ALLOCATOR_DEFAULT").unwrap();
        assert!(string_at < fmt_at);
        assert!(fmt_at < alloc_at);
    }

    #[test]
    fn allocator_variants_share_entry_points() {
        let spliced = splice();
        assert!(spliced.contains("cz_heap_dup"));
        assert!(spliced.contains("cz_array_new"));
        assert!(spliced.contains("cz_map_new"));
    }
}
