//! Identity import
//!
//! Adopts a deployment that already exists remotely. No remote call is made;
//! the next read fills in everything else.

use shared::DeclaredDeployment;

/// Track `id` verbatim as the deployment identity
pub fn import(id: impl Into<String>) -> DeclaredDeployment {
    DeclaredDeployment {
        id: id.into(),
        ..Default::default()
    }
}

/// Accept `<organization>/<id>` as well as a bare identity
///
/// The organization part lets the following read run without a configured
/// default organization.
pub fn import_composite(raw: &str) -> DeclaredDeployment {
    match raw.split_once('/') {
        Some((organization_id, id)) if !organization_id.is_empty() && !id.is_empty() => {
            DeclaredDeployment {
                organization_id: organization_id.to_string(),
                ..import(id)
            }
        }
        _ => import(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_is_verbatim() {
        let stub = import("  clx9-Deployment ");
        assert_eq!(stub.id, "  clx9-Deployment ");
        assert!(stub.is_import_stub());
        assert!(stub.organization_id.is_empty());
        assert!(stub.worker_queues.is_empty());
    }

    #[test]
    fn test_composite_identity() {
        let stub = import_composite("org-1/dep-1");
        assert_eq!(stub.organization_id, "org-1");
        assert_eq!(stub.id, "dep-1");
        assert!(stub.is_import_stub());
    }

    #[test]
    fn test_malformed_composite_falls_back_to_verbatim() {
        assert_eq!(import_composite("/dep-1").id, "/dep-1");
        assert_eq!(import_composite("org-1/").id, "org-1/");
        assert_eq!(import_composite("dep-1").id, "dep-1");
    }
}
