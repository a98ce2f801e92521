//! Fast hash-map/set aliases used on the hot paths (trace buffer, AST
//! evaluation context). `rustc-hash`'s `FxHash` trades DoS-resistance for
//! speed, which is fine here: keys are span/trace/attribute identifiers we
//! generate or validate ourselves, never raw untrusted network input.

use rustc_hash::FxHashMap as InnerMap;
use rustc_hash::FxHashSet as InnerSet;

pub type FxHashMap<K, V> = InnerMap<K, V>;
pub type FxHashSet<T> = InnerSet<T>;
