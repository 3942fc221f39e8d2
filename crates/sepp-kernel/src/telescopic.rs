//! Nsepp telescopic-FQDN mapping contract.
//!
//! Topology hiding replaces a foreign FQDN with a *telescopic label* that is
//! only meaningful inside this domain:
//!
//! ```text
//! <label representing the FQDN from the other PLMN>.<FQDN of the local SEPP>
//! ```

use crate::error::MappingQueryError;
use crate::n32::Fqdn;
use serde::{Deserialize, Serialize};

/// Path prefix of the Nsepp telescopic API.
pub const NSEPP_TELESCOPIC_PREFIX: &str = "/nsepp-telescopic/v1";

/// Full path of the mapping lookup operation.
pub const MAPPING_PATH: &str = "/nsepp-telescopic/v1/mapping";

/// Body of a successful mapping lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TelescopicMapping {
    pub telescopic_label: String,
    pub sepp_domain: Fqdn,
    pub foreign_fqdn: Fqdn,
}

/// Query string of `GET /nsepp-telescopic/v1/mapping`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MappingQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telescopic_label: Option<String>,
}

/// The single lookup a well-formed [`MappingQuery`] asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingLookup {
    /// Real foreign FQDN → telescopic label.
    Mask(Fqdn),
    /// Telescopic label → real foreign FQDN.
    Unmask(String),
}

impl MappingQuery {
    /// Enforce "exactly one of `foreign-fqdn` / `telescopic-label`".
    ///
    /// An empty parameter (`?foreign-fqdn=`) counts as absent.
    pub fn lookup(&self) -> Result<MappingLookup, MappingQueryError> {
        let foreign = self.foreign_fqdn.as_deref().filter(|v| !v.is_empty());
        let label = self.telescopic_label.as_deref().filter(|v| !v.is_empty());

        match (foreign, label) {
            (Some(foreign), None) => Ok(MappingLookup::Mask(Fqdn::from(foreign))),
            (None, Some(label)) => Ok(MappingLookup::Unmask(label.to_string())),
            (Some(_), Some(_)) => Err(MappingQueryError::BothProvided),
            (None, None) => Err(MappingQueryError::NeitherProvided),
        }
    }
}

/// Derive the telescopic label for `foreign_fqdn` under `local_domain`.
///
/// Pure: the peer-derived part always comes first, the local suffix second.
pub fn mask(foreign_fqdn: &Fqdn, local_domain: &Fqdn) -> String {
    format!("{}.{}", foreign_fqdn, local_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(foreign: Option<&str>, label: Option<&str>) -> MappingQuery {
        MappingQuery {
            foreign_fqdn: foreign.map(str::to_string),
            telescopic_label: label.map(str::to_string),
        }
    }

    #[test]
    fn mask_joins_foreign_then_local() {
        let label = mask(&Fqdn::from("amf.plmn-b.example"), &Fqdn::from("sepp.plmn-a.example"));
        assert_eq!(label, "amf.plmn-b.example.sepp.plmn-a.example");
    }

    #[test]
    fn exactly_one_parameter_is_accepted() {
        assert_eq!(
            query(Some("amf.example"), None).lookup(),
            Ok(MappingLookup::Mask(Fqdn::from("amf.example")))
        );
        assert_eq!(
            query(None, Some("abc.sepp.example")).lookup(),
            Ok(MappingLookup::Unmask("abc.sepp.example".to_string()))
        );
    }

    #[test]
    fn both_or_neither_is_rejected() {
        assert_eq!(query(None, None).lookup(), Err(MappingQueryError::NeitherProvided));
        assert_eq!(
            query(Some("a"), Some("b")).lookup(),
            Err(MappingQueryError::BothProvided)
        );
        assert_eq!(
            query(Some(""), Some("")).lookup(),
            Err(MappingQueryError::NeitherProvided)
        );
    }

    #[test]
    fn mapping_serializes_with_wire_names() {
        let mapping = TelescopicMapping {
            telescopic_label: "amf.b.sepp.a".into(),
            sepp_domain: Fqdn::from("sepp.a"),
            foreign_fqdn: Fqdn::from("amf.b"),
        };
        let json = serde_json::to_value(&mapping).unwrap();
        assert_eq!(json["TelescopicLabel"], "amf.b.sepp.a");
        assert_eq!(json["SeppDomain"], "sepp.a");
        assert_eq!(json["ForeignFqdn"], "amf.b");
    }
}
