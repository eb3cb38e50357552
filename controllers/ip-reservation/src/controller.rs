//! Main controller implementation.
//!
//! Builds the provider from the network declarations and store, then runs
//! every claim through a bounded pool of concurrent workers.

use crate::config::{load_cloud_config, ClaimAction, ClaimSpec, ClaimsFile, ControllerConfig};
use crate::error::ControllerError;
use futures::stream::{self, StreamExt};
use ip_provider::{IpProvider, IpRepo};
use ip_store::SqliteIpStore;
use network_model::{
    default_network_properties, Network, NetworkSettings, Reservation, ReservationState, ReservationType,
};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one claim
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimOutcome {
    pub instance: String,
    pub network: String,
    pub action: ClaimAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub reservation_type: Option<ReservationType>,
    pub state: ReservationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<NetworkSettings>,
    /// Why an existing address was left unreserved; does not fail the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unreserved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClaimOutcome {
    fn failed(claim: &ClaimSpec, error: impl Into<String>) -> Self {
        Self {
            instance: claim.instance.to_string(),
            network: claim.network.clone(),
            action: claim.action,
            ip: claim.ip,
            reservation_type: claim.reservation_type,
            state: ReservationState::Rejected,
            settings: None,
            unreserved: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Main controller for IP reservation claims.
#[derive(Debug)]
pub struct Controller {
    provider: IpProvider,
    claims: Vec<ClaimSpec>,
    max_workers: usize,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: &ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing IP Reservation Controller");

        let cloud_config = load_cloud_config(&config.network_config)?;
        let networks = Network::parse_all(&cloud_config, &config.subnet_options())?;
        let claims = ClaimsFile::load(&config.claims_file)?.claims;

        let store = SqliteIpStore::connect(&config.database_url).await?;
        let provider = IpProvider::new(IpRepo::new(Arc::new(store), config.task_id.clone()), networks);

        info!("Loaded {} claims for {} networks", claims.len(), provider.networks().len());
        Ok(Self::with_provider(provider, claims, config.max_workers))
    }

    /// Creates a controller around an already built provider.
    pub fn with_provider(provider: IpProvider, claims: Vec<ClaimSpec>, max_workers: usize) -> Self {
        Self {
            provider,
            claims,
            max_workers: max_workers.max(1),
        }
    }

    /// Runs every claim and returns the outcomes in claim order.
    pub async fn run(self) -> Vec<ClaimOutcome> {
        info!("Running {} claims with {} workers", self.claims.len(), self.max_workers);
        let provider = &self.provider;

        let mut outcomes: Vec<(usize, ClaimOutcome)> = stream::iter(self.claims.iter().enumerate())
            .map(|(idx, claim)| async move { (idx, process_claim(provider, claim).await) })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _)| *idx);

        let outcomes: Vec<ClaimOutcome> = outcomes.into_iter().map(|(_, outcome)| outcome).collect();
        let failed = outcomes.iter().filter(|outcome| outcome.is_failed()).count();
        info!("Finished {} claims, {} failed", outcomes.len(), failed);
        outcomes
    }
}

async fn process_claim(provider: &IpProvider, claim: &ClaimSpec) -> ClaimOutcome {
    let Some(network) = provider.network(&claim.network).map(Arc::clone) else {
        warn!("Claim for instance {} names unknown network {}", claim.instance, claim.network);
        return ClaimOutcome::failed(claim, format!("Unknown network '{}'", claim.network));
    };

    let mut reservation = match build_reservation(claim, network) {
        Ok(reservation) => reservation,
        Err(reason) => return ClaimOutcome::failed(claim, reason),
    };
    debug!("Processing {:?} for {}", claim.action, reservation);

    let result = match claim.action {
        ClaimAction::Release => provider.release(&reservation).await,
        ClaimAction::Reserve if reservation.is_existing() => provider.reserve_existing_ips(&mut reservation).await,
        ClaimAction::Reserve => provider.reserve(&mut reservation).await,
    };

    let mut outcome = ClaimOutcome {
        instance: claim.instance.to_string(),
        network: reservation.network().name().to_string(),
        action: claim.action,
        ip: reservation.ip(),
        reservation_type: reservation.reservation_type(),
        state: reservation.state(),
        settings: None,
        unreserved: None,
        error: None,
    };

    if let Err(err) = result {
        outcome.error = Some(err.to_string());
        outcome.state = ReservationState::Rejected;
        return outcome;
    }

    if reservation.state() == ReservationState::Rejected {
        warn!("Existing IP of {} left unreserved", reservation);
        outcome.unreserved = reservation.error().map(ToString::to_string);
        return outcome;
    }

    if claim.action == ClaimAction::Reserve && reservation.is_reserved() {
        let defaults = claim
            .default_properties
            .clone()
            .unwrap_or_else(default_network_properties);
        match reservation
            .network()
            .network_settings(&reservation, &defaults, reservation.availability_zone())
        {
            Ok(settings) => outcome.settings = Some(settings),
            Err(err) => {
                warn!("Failed to render settings for {}: {}", reservation, err);
                outcome.error = Some(err.to_string());
            }
        }
    }
    outcome
}

fn build_reservation(claim: &ClaimSpec, network: Arc<Network>) -> Result<Reservation, String> {
    let instance = claim.instance.clone();

    if let Some(existing) = claim.existing {
        let ip = claim
            .ip
            .ok_or_else(|| format!("Existing reservation for instance {} has no IP", claim.instance))?;
        return Ok(Reservation::existing(instance, network, ip, existing));
    }

    let reservation_type = claim.reservation_type.unwrap_or(if claim.ip.is_some() {
        ReservationType::Static
    } else {
        ReservationType::Dynamic
    });

    match (reservation_type, claim.ip) {
        (ReservationType::Static, Some(ip)) => Ok(Reservation::new_static(instance, network, ip)),
        // Vips are always static; the provider picks one from the pool
        (ReservationType::Static, None) if matches!(network.as_ref(), Network::Vip(_)) => {
            Ok(Reservation::new_dynamic(instance, network))
        }
        (ReservationType::Static, None) => Err(format!(
            "Static reservation for instance {} has no IP",
            claim.instance
        )),
        (ReservationType::Dynamic, ip) => {
            let mut reservation = Reservation::new_dynamic(instance, network);
            if let Some(ip) = ip {
                reservation.resolve_ip(ip);
            }
            Ok(reservation)
        }
    }
}
