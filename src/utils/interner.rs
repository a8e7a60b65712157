//! Global string interner
//!
//! Maps shader property names to compact integer symbols that hash and compare
//! in O(1).

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier of an interned string.
pub type Symbol = Spur;

/// Interns `s`, returning the existing symbol if it was seen before.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up the symbol of an already interned string.
///
/// Never allocates; returns `None` for strings that were never interned.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Interns the property names most built-in shaders declare, so the first
/// frame does not pay for them.
pub fn preload_common_properties() {
    let common = [
        // Surface
        "mainColor",
        "mainTexture",
        "albedoScale",
        "tilingOffset",
        "alphaThreshold",
        "roughness",
        "metallic",
        "emissive",
        "normalMap",
        // Per-model
        "worldMatrix",
        "worldMatrixInverse",
        "normalMatrix",
        // Scene
        "ambientSky",
        "fogColor",
        "fogParams",
    ];

    for name in common {
        intern(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let s1 = intern("hello");
        let s2 = intern("hello");
        let s3 = intern("world");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
        assert_eq!(get("world"), Some(s3));
    }

    #[test]
    fn test_get() {
        let _ = intern("existing");

        assert!(get("existing").is_some());
        assert!(get("never_interned_property_name").is_none());
    }

    #[test]
    fn test_preload() {
        preload_common_properties();
        assert!(get("mainColor").is_some());
    }
}
