//! Settings resolver: turns a certification's persisted settings block into a
//! fully populated, typed value.
//!
//! The persisted block is free-form JSON and may be stale or corrupt. The
//! resolver never fails: every absent or unrecognized field falls back to its
//! default with a `warn!` diagnostic, so broken configuration can never block
//! read access. The resolved value is produced once per operation and passed
//! down; nothing else reads the raw block.

use serde_json::Value;
use tracing::warn;

use recert_core::Certification;

use crate::delay::CalendarDelay;

// ── Rule enums ──────────────────────────────────────────────────────

/// Post-cycle cleanup handed to the external enrollment collaborator.
/// Opaque to this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    None,
    Deallocate,
    Unenrol,
    Purge,
}

impl ResetType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "deallocate" => Some(Self::Deallocate),
            "unenrol" => Some(Self::Unenrol),
            "purge" => Some(Self::Purge),
            _ => None,
        }
    }
}

/// Which resolved date a period's `valid_from` anchors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidSince {
    Certified,
    WindowStart,
    WindowDue,
    WindowEnd,
}

impl ValidSince {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "certified" => Some(Self::Certified),
            "windowstart" => Some(Self::WindowStart),
            "windowdue" => Some(Self::WindowDue),
            "windowend" => Some(Self::WindowEnd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEndSince {
    Never,
    WindowStart,
    WindowDue,
}

impl WindowEndSince {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "never" => Some(Self::Never),
            "windowstart" => Some(Self::WindowStart),
            "windowdue" => Some(Self::WindowDue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirySince {
    Never,
    Certified,
    WindowStart,
    WindowDue,
    WindowEnd,
}

impl ExpirySince {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "never" => Some(Self::Never),
            "certified" => Some(Self::Certified),
            "windowstart" => Some(Self::WindowStart),
            "windowdue" => Some(Self::WindowDue),
            "windowend" => Some(Self::WindowEnd),
            _ => None,
        }
    }
}

// ── Resolved rules ──────────────────────────────────────────────────

/// `window_end = <since> + delay`. An unset delay yields no window end
/// (a zero-delay end would collide with its own anchor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEndRule {
    pub since: WindowEndSince,
    pub delay: Option<CalendarDelay>,
}

impl WindowEndRule {
    pub const NEVER: Self = Self {
        since: WindowEndSince::Never,
        delay: None,
    };
}

/// `valid_until = <since> + delay`. An unset delay means the anchor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationRule {
    pub since: ExpirySince,
    pub delay: Option<CalendarDelay>,
}

impl ExpirationRule {
    pub const NEVER: Self = Self {
        since: ExpirySince::Never,
        delay: None,
    };
}

/// Fully resolved rules for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSettings {
    pub reset_type: ResetType,
    /// Soft-deadline offset from window start, seconds. First cycles only.
    pub due_offset: Option<i64>,
    pub valid_since: ValidSince,
    pub window_end: WindowEndRule,
    pub expiration: ExpirationRule,
    /// Assignment grace extension after recertification, seconds. Phase 2 only.
    pub grace: Option<i64>,
}

/// Both phases, fully resolved. Phase 1 governs a user's first cycle,
/// phase 2 every recertification cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificationSettings {
    pub phase1: PhaseSettings,
    pub phase2: PhaseSettings,
}

impl CertificationSettings {
    /// Resolve a certification's persisted settings block.
    pub fn resolve(certification: &Certification) -> Self {
        resolve(&certification.settings, certification.recertification_enabled())
    }
}

// ── Resolution ──────────────────────────────────────────────────────

/// Resolve a raw settings block. Never fails; see module docs.
pub fn resolve(raw: &Value, recertification_enabled: bool) -> CertificationSettings {
    let phase1 = PhaseSettings {
        reset_type: enum_field(raw, "resettype1", ResetType::parse, ResetType::None),
        due_offset: seconds_field(raw, "due1"),
        valid_since: enum_field(raw, "valid1", ValidSince::parse, ValidSince::Certified),
        window_end: window_end_field(raw, "windowend1", WindowEndRule::NEVER),
        expiration: expiration_field(raw, "expiration1", ExpirationRule::NEVER),
        grace: None,
    };

    // Without recertification there is no meaningful independent phase-2
    // window configuration: mirror phase 1. With it, windowend2/expiration2
    // still fall back to the phase-1 rules until explicitly set.
    let (window_end2, expiration2) = if recertification_enabled {
        (
            window_end_field(raw, "windowend2", phase1.window_end),
            expiration_field(raw, "expiration2", phase1.expiration),
        )
    } else {
        (phase1.window_end, phase1.expiration)
    };

    let phase2 = PhaseSettings {
        reset_type: enum_field(raw, "resettype2", ResetType::parse, ResetType::None),
        due_offset: None,
        valid_since: enum_field(raw, "valid2", ValidSince::parse, ValidSince::Certified),
        window_end: window_end2,
        expiration: expiration2,
        grace: seconds_field(raw, "grace2"),
    };

    CertificationSettings { phase1, phase2 }
}

// ── Field helpers ───────────────────────────────────────────────────

fn enum_field<T: Copy>(raw: &Value, key: &str, parse: fn(&str) -> Option<T>, default: T) -> T {
    match raw.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::String(s)) => parse(s).unwrap_or_else(|| {
            warn!(field = key, value = %s, "unknown settings value, using default");
            default
        }),
        Some(_) => {
            warn!(field = key, "settings field has wrong type, using default");
            default
        }
    }
}

/// A positive seconds count. Absent, zero or negative normalize to unset.
fn seconds_field(raw: &Value, key: &str) -> Option<i64> {
    match raw.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_i64() {
            Some(n) if n > 0 => Some(n),
            Some(_) => None,
            None => {
                warn!(field = key, "settings field is not an integer, treating as unset");
                None
            }
        },
    }
}

fn window_end_field(raw: &Value, key: &str, default: WindowEndRule) -> WindowEndRule {
    let Some(obj) = rule_object(raw, key) else {
        return default;
    };
    WindowEndRule {
        since: enum_field(obj, "since", WindowEndSince::parse, default.since),
        delay: delay_field(obj, key),
    }
}

fn expiration_field(raw: &Value, key: &str, default: ExpirationRule) -> ExpirationRule {
    let Some(obj) = rule_object(raw, key) else {
        return default;
    };
    ExpirationRule {
        since: enum_field(obj, "since", ExpirySince::parse, default.since),
        delay: delay_field(obj, key),
    }
}

fn rule_object<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    match raw.get(key) {
        None | Some(Value::Null) => None,
        Some(obj @ Value::Object(_)) => Some(obj),
        Some(_) => {
            warn!(field = key, "settings rule is not an object, using default");
            None
        }
    }
}

fn delay_field(obj: &Value, key: &str) -> Option<CalendarDelay> {
    match obj.get("delay") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => {
            let parsed = CalendarDelay::parse(s);
            if parsed.is_none() && !CalendarDelay::is_zero(s) {
                warn!(field = key, value = %s, "unparseable delay, treating as unset");
            }
            parsed
        }
        Some(_) => {
            warn!(field = key, "delay is not a string, treating as unset");
            None
        }
    }
}
