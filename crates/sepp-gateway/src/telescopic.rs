//! Nsepp telescopic FQDN mapping.

use crate::context::SeppContext;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use sepp_kernel::n32::Fqdn;
use sepp_kernel::telescopic::{self, MAPPING_PATH, MappingLookup, MappingQuery, TelescopicMapping};
use std::sync::Arc;
use tracing::{debug, warn};

/// Translates between foreign FQDNs and labels under our own domain.
#[derive(Clone)]
pub struct TopologyMapper {
    ctx: Arc<SeppContext>,
}

impl TopologyMapper {
    pub fn new(ctx: Arc<SeppContext>) -> Self {
        Self { ctx }
    }

    /// Foreign FQDN → `<foreign>.<local sepp fqdn>`.
    pub fn mask(&self, foreign: &Fqdn) -> TelescopicMapping {
        let local = self.ctx.local_fqdn();
        TelescopicMapping {
            telescopic_label: telescopic::mask(foreign, local),
            sepp_domain: local.clone(),
            foreign_fqdn: foreign.clone(),
        }
    }

    /// Label → the FQDN of the negotiated peer.
    ///
    /// The label is echoed back but not parsed; the answer is whichever peer
    /// is currently negotiated, or empty before the first handshake.
    pub fn unmask(&self, label: &str) -> TelescopicMapping {
        TelescopicMapping {
            telescopic_label: label.to_string(),
            sepp_domain: self.ctx.local_fqdn().clone(),
            foreign_fqdn: self.ctx.remote_fqdn().unwrap_or_default(),
        }
    }

    pub fn resolve(&self, lookup: &MappingLookup) -> TelescopicMapping {
        match lookup {
            MappingLookup::Mask(foreign) => self.mask(foreign),
            MappingLookup::Unmask(label) => self.unmask(label),
        }
    }
}

pub async fn get_mapping(
    State(mapper): State<TopologyMapper>,
    Query(query): Query<MappingQuery>,
) -> Response {
    match query.lookup() {
        Ok(lookup) => {
            let mapping = mapper.resolve(&lookup);
            debug!(?lookup, label = %mapping.telescopic_label, "mapping resolved");
            (StatusCode::OK, Json(mapping)).into_response()
        }
        Err(e) => {
            warn!(reason = %e, "rejected mapping query");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

pub fn mapping_router(mapper: TopologyMapper) -> Router {
    Router::new()
        .route(MAPPING_PATH, get(get_mapping))
        .with_state(mapper)
}
