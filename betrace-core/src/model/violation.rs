//! The signed `Violation` record (§3). Signature computation lives here
//! because it is purely a function of the record's bytes and an injected
//! key — no store state is involved — but the key itself is owned and
//! guarded by `betrace-store::ViolationStore`, never by this type.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::rule::Severity;
use super::value::{canonical_bytes, Value};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub trace_id: String,
    pub first_span_id: String,
    pub detected_at: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    pub signature: Vec<u8>,
}

impl Violation {
    /// `HMAC-SHA256(key, id || rule_id || trace_id || detected_at ||
    /// canonical(message) || canonical(context))`, exactly as specified in
    /// §3. Each field is length-prefixed so no ambiguity is possible
    /// between e.g. `id="ab"` `rule_id="c"` and `id="a"` `rule_id="bc"`.
    pub fn compute_signature(
        key: &[u8],
        id: &str,
        rule_id: &str,
        trace_id: &str,
        detected_at: DateTime<Utc>,
        message: &str,
        context: &BTreeMap<String, Value>,
    ) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
        write_field(&mut mac, id.as_bytes());
        write_field(&mut mac, rule_id.as_bytes());
        write_field(&mut mac, trace_id.as_bytes());
        write_field(&mut mac, detected_at.to_rfc3339().as_bytes());
        write_field(&mut mac, &canonical_bytes(&Value::Str(message.to_string())));
        write_field(&mut mac, &canonical_context(context));
        mac.finalize().into_bytes().to_vec()
    }

    /// Recomputes the signature from the record's own fields and compares
    /// it in constant time (§3 invariant, §8 property 9: no early return on
    /// mismatch).
    pub fn verify(&self, key: &[u8]) -> bool {
        let expected = Self::compute_signature(
            key,
            &self.id,
            &self.rule_id,
            &self.trace_id,
            self.detected_at,
            &self.message,
            &self.context,
        );
        // `subtle::ConstantTimeEq` never short-circuits on the first
        // differing byte, which `==` on `Vec<u8>` would.
        expected.len() == self.signature.len() && expected.ct_eq(&self.signature).into()
    }
}

fn write_field(mac: &mut HmacSha256, bytes: &[u8]) {
    mac.update(&(bytes.len() as u64).to_be_bytes());
    mac.update(bytes);
}

/// BTreeMap already iterates keys in lexicographic order, which is the
/// ordering §3's `canonical()` requires for the context map.
fn canonical_context(context: &BTreeMap<String, Value>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(context.len() as u64).to_be_bytes());
    for (k, v) in context {
        buf.extend_from_slice(&(k.len() as u64).to_be_bytes());
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(&canonical_bytes(v));
    }
    buf
}

/// Filters accepted by `ViolationStore::query` (§4.G). Conjunctive: every
/// `Some`/non-empty field must match.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub rule_id: Option<String>,
    pub severity: Option<Severity>,
    pub trace_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ViolationFilter {
    pub fn matches(&self, v: &Violation) -> bool {
        if let Some(rid) = &self.rule_id {
            if &v.rule_id != rid {
                return false;
            }
        }
        if let Some(sev) = self.severity {
            if v.severity != sev {
                return false;
            }
        }
        if let Some(tid) = &self.trace_id {
            if &v.trace_id != tid {
                return false;
            }
        }
        if let Some(since) = self.since {
            if v.detected_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if v.detected_at > until {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Violation {
        Violation {
            id: id.to_string(),
            rule_id: "rule-1".to_string(),
            rule_name: "payment fraud check".to_string(),
            trace_id: "trace-1".to_string(),
            first_span_id: "span-1".to_string(),
            detected_at: Utc::now(),
            severity: Severity::High,
            message: "always clause failed".to_string(),
            context: BTreeMap::new(),
            signature: Vec::new(),
        }
    }

    #[test]
    fn signature_round_trips() {
        let key = b"secret-key";
        let mut v = sample("v1");
        v.signature = Violation::compute_signature(
            key,
            &v.id,
            &v.rule_id,
            &v.trace_id,
            v.detected_at,
            &v.message,
            &v.context,
        );
        assert!(v.verify(key));
    }

    #[test]
    fn tamper_is_detected() {
        let key = b"secret-key";
        let mut v = sample("v1");
        v.signature = Violation::compute_signature(
            key,
            &v.id,
            &v.rule_id,
            &v.trace_id,
            v.detected_at,
            &v.message,
            &v.context,
        );
        v.message.push('!');
        assert!(!v.verify(key));
    }

    #[test]
    fn replay_across_ids_fails() {
        let key = b"secret-key";
        let mut a = sample("violation-a");
        a.signature = Violation::compute_signature(
            key,
            &a.id,
            &a.rule_id,
            &a.trace_id,
            a.detected_at,
            &a.message,
            &a.context,
        );
        let mut b = sample("violation-b");
        b.detected_at = a.detected_at;
        b.signature = a.signature;
        assert!(!b.verify(key));
    }
}
