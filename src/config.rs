//! Configuration types.

use std::path::PathBuf;

/// Service configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Listen address for the HTTP server.
    pub bind: String,
    /// Path to the local database file.
    pub db_path: PathBuf,
    /// Keep a JSON audit copy of each raw webhook payload on the enquiry.
    pub store_raw_payload: bool,
    /// Directory for the daily-rolling operator log file (disabled if unset).
    pub log_dir: Option<PathBuf>,
}

impl IntakeConfig {
    /// Build config from environment variables, with defaults for anything unset.
    pub fn from_env() -> Self {
        let bind = std::env::var("INTAKE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let db_path = std::env::var("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/enquiry-intake.db"));

        let store_raw_payload = std::env::var("INTAKE_STORE_RAW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let log_dir = std::env::var("INTAKE_LOG_DIR").ok().map(PathBuf::from);

        Self {
            bind,
            db_path,
            store_raw_payload,
            log_dir,
        }
    }
}

// ── Tenant directory ────────────────────────────────────────────────

/// A tenant's inbound-email routing entry.
///
/// `prefix` is the mailbox local part the tenant receives leads on
/// (the portion before `@`), stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub prefix: String,
    pub user_id: String,
}

/// Maps inbound recipient addresses to owning users.
///
/// Lookup is by mailbox prefix: the recipient's local part, lowercased,
/// with any `+tag` suffix stripped. Unroutable recipients resolve to the
/// fallback owner so a lead is never dropped.
#[derive(Debug, Clone)]
pub struct TenantDirectory {
    tenants: Vec<Tenant>,
    fallback_owner: String,
}

impl TenantDirectory {
    /// Build the directory from `INTAKE_TENANTS` / `INTAKE_FALLBACK_OWNER`.
    ///
    /// `INTAKE_TENANTS` is a comma-separated list of `prefix=user_id` pairs,
    /// e.g. `sarah=usr-sarah,mike=usr-mike`. Malformed entries are skipped
    /// with a warning.
    pub fn from_env() -> Self {
        let raw = std::env::var("INTAKE_TENANTS").unwrap_or_default();
        let fallback =
            std::env::var("INTAKE_FALLBACK_OWNER").unwrap_or_else(|_| "admin".to_string());
        Self::parse(&raw, fallback)
    }

    /// Parse a `prefix=user_id,prefix=user_id` mapping string.
    pub fn parse(raw: &str, fallback_owner: String) -> Self {
        let mut tenants = Vec::new();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once('=') {
                Some((prefix, user_id)) if !prefix.trim().is_empty() && !user_id.trim().is_empty() => {
                    tenants.push(Tenant {
                        prefix: prefix.trim().to_lowercase(),
                        user_id: user_id.trim().to_string(),
                    });
                }
                _ => {
                    tracing::warn!(entry, "Skipping malformed tenant entry");
                }
            }
        }
        Self {
            tenants,
            fallback_owner,
        }
    }

    /// Construct directly from parts (used by tests and embedders).
    pub fn new(tenants: Vec<Tenant>, fallback_owner: String) -> Self {
        Self {
            tenants,
            fallback_owner,
        }
    }

    /// Number of configured tenants.
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// Whether no tenants are configured.
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    /// The owner every unroutable lead lands on.
    pub fn fallback_owner(&self) -> &str {
        &self.fallback_owner
    }

    /// Resolve the owning user for a recipient address.
    ///
    /// Falls back to the fallback owner when the recipient is absent,
    /// has an empty local part, or matches no configured tenant.
    pub fn resolve_owner(&self, recipient: Option<&str>) -> &str {
        let Some(recipient) = recipient else {
            return &self.fallback_owner;
        };
        let Some(prefix) = mailbox_prefix(recipient) else {
            return &self.fallback_owner;
        };
        self.tenants
            .iter()
            .find(|t| t.prefix == prefix)
            .map(|t| t.user_id.as_str())
            .unwrap_or(&self.fallback_owner)
    }
}

/// Extract the routing prefix from an address: local part before `@`,
/// lowercased, with any `+tag` suffix stripped.
fn mailbox_prefix(addr: &str) -> Option<String> {
    let local = addr.trim().split('@').next().unwrap_or("");
    let local = local.split('+').next().unwrap_or(local);
    let prefix = local.trim().to_lowercase();
    if prefix.is_empty() { None } else { Some(prefix) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> TenantDirectory {
        TenantDirectory::parse("sarah=usr-sarah, mike=usr-mike", "admin".to_string())
    }

    #[test]
    fn parses_tenant_entries() {
        let dir = directory();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.fallback_owner(), "admin");
    }

    #[test]
    fn skips_malformed_entries() {
        let dir = TenantDirectory::parse("sarah=usr-sarah,bogus,=x,y=", "admin".to_string());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn resolves_exact_prefix() {
        let dir = directory();
        assert_eq!(
            dir.resolve_owner(Some("sarah@mail.gigflow.example")),
            "usr-sarah"
        );
    }

    #[test]
    fn resolution_is_case_insensitive() {
        let dir = directory();
        assert_eq!(dir.resolve_owner(Some("Sarah@Mail.Example")), "usr-sarah");
    }

    #[test]
    fn strips_plus_tag() {
        let dir = directory();
        assert_eq!(
            dir.resolve_owner(Some("mike+website@mail.example")),
            "usr-mike"
        );
    }

    #[test]
    fn unroutable_prefix_falls_back() {
        let dir = directory();
        assert_eq!(dir.resolve_owner(Some("nobody@mail.example")), "admin");
    }

    #[test]
    fn missing_recipient_falls_back() {
        let dir = directory();
        assert_eq!(dir.resolve_owner(None), "admin");
        assert_eq!(dir.resolve_owner(Some("")), "admin");
        assert_eq!(dir.resolve_owner(Some("@mail.example")), "admin");
    }

    #[test]
    fn address_without_at_uses_whole_string() {
        let dir = directory();
        assert_eq!(dir.resolve_owner(Some("sarah")), "usr-sarah");
    }
}
