//! Address provider
//!
//! Decides which network and subnet own a reservation, validates it against
//! the subnet's pools, and hands persistence to [`IpRepo`].

use crate::error::ReservationError;
use crate::repo::IpRepo;
use network_model::{
    ExistingNetworkType, ManualSubnet, Network, Reservation, ReservationType, VipNetwork,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reserves, re-reserves and releases addresses across all configured networks
#[derive(Debug, Clone)]
pub struct IpProvider {
    ip_repo: IpRepo,
    networks: Vec<Arc<Network>>,
}

impl IpProvider {
    /// Create a provider reserving addresses on `networks` through `ip_repo`
    pub fn new(ip_repo: IpRepo, networks: Vec<Arc<Network>>) -> Self {
        Self { ip_repo, networks }
    }

    /// Networks the provider can reserve on, in declaration order
    pub fn networks(&self) -> &[Arc<Network>] {
        &self.networks
    }

    /// Network by name
    pub fn network(&self, name: &str) -> Option<&Arc<Network>> {
        self.networks.iter().find(|network| network.name() == name)
    }

    /// Reserve an address for the reservation
    ///
    /// On success the reservation is `Reserved`, holds its address and points
    /// at the network that owns it. On failure it is `Rejected` and the error
    /// is returned.
    pub async fn reserve(&self, reservation: &mut Reservation) -> Result<(), ReservationError> {
        let network = Arc::clone(reservation.network());
        debug!("Reserving {}", reservation);

        let result = match network.as_ref() {
            Network::Manual(_) => match reservation.ip() {
                Some(ip) => self.reserve_manual_ip(reservation, &network, ip).await,
                None => self.allocate_manual_ip(reservation, &network).await,
            },
            Network::Vip(vip) => self.reserve_vip(reservation, vip).await,
            Network::Dynamic(_) => Self::reserve_dynamic(reservation),
        };

        if let Err(err) = &result {
            warn!("Failed to reserve {}: {}", reservation, err);
            reservation.reject(err.to_string());
        }
        result
    }

    /// Re-reserve an address recorded by a previous deploy
    ///
    /// Reclassifies static/dynamic against the declared network only. Policy
    /// conflicts leave the reservation rejected without failing; only storage
    /// errors are returned.
    pub async fn reserve_existing_ips(&self, reservation: &mut Reservation) -> Result<(), ReservationError> {
        match self.try_reserve_existing(reservation).await {
            Ok(()) => Ok(()),
            Err(ReservationError::Store(err)) => {
                reservation.reject(err.to_string());
                Err(ReservationError::Store(err))
            }
            Err(err) => {
                warn!("Leaving existing reservation {} unreserved: {}", reservation, err);
                reservation.reject(err.to_string());
                Ok(())
            }
        }
    }

    /// Release the reservation's address
    ///
    /// Keyed on the address alone, so subnets that were removed since the
    /// reservation was made do not matter.
    pub async fn release(&self, reservation: &Reservation) -> Result<(), ReservationError> {
        match reservation.ip() {
            Some(ip) => {
                debug!("Releasing {}", reservation);
                self.ip_repo.delete(ip).await
            }
            None if matches!(reservation.network().as_ref(), Network::Dynamic(_)) => {
                debug!("Nothing to release for {}", reservation);
                Ok(())
            }
            None => Err(ReservationError::IpMissing),
        }
    }

    async fn reserve_manual_ip(
        &self,
        reservation: &mut Reservation,
        declared: &Arc<Network>,
        ip: IpAddr,
    ) -> Result<(), ReservationError> {
        let owner = self
            .network_containing(declared, &ip)
            .ok_or_else(|| ReservationError::OutsideSubnet {
                ip,
                network: declared.name().to_string(),
            })?;
        let subnet = owner
            .subnet_containing(&ip)
            .ok_or_else(|| ReservationError::OutsideSubnet {
                ip,
                network: owner.name().to_string(),
            })?;

        if subnet.is_restricted(&ip) {
            return Err(ReservationError::IpReserved {
                ip,
                network: owner.name().to_string(),
            });
        }

        let in_static_pool = subnet.is_static(&ip);
        match reservation.reservation_type() {
            None => reservation.resolve_type(if in_static_pool {
                ReservationType::Static
            } else {
                ReservationType::Dynamic
            }),
            Some(ReservationType::Static) if !in_static_pool => {
                return Err(ReservationError::WrongType {
                    ip,
                    network: owner.name().to_string(),
                    pool: "static".to_string(),
                });
            }
            Some(ReservationType::Dynamic) if in_static_pool => {
                return Err(ReservationError::WrongType {
                    ip,
                    network: owner.name().to_string(),
                    pool: "dynamic".to_string(),
                });
            }
            Some(_) => {}
        }

        if owner.name() != declared.name() {
            info!(
                "IP {} belongs to network {}, moving reservation of instance {} from network {}",
                ip,
                owner.name(),
                reservation.instance(),
                declared.name()
            );
            reservation.set_network(Arc::clone(&owner));
        }

        self.ip_repo.add(reservation).await?;
        reservation.mark_reserved();
        Ok(())
    }

    async fn allocate_manual_ip(
        &self,
        reservation: &mut Reservation,
        declared: &Arc<Network>,
    ) -> Result<(), ReservationError> {
        let az = reservation.availability_zone().map(ToString::to_string);

        for (network, subnet) in self.candidate_subnets(declared, az.as_deref()) {
            if let Some(ip) = self.ip_repo.allocate_dynamic_ip(reservation, subnet).await? {
                reservation.resolve_ip(ip);
                reservation.resolve_type(ReservationType::Dynamic);
                if network.name() != declared.name() {
                    reservation.set_network(Arc::clone(network));
                }
                reservation.mark_reserved();
                return Ok(());
            }
        }

        Err(ReservationError::NotEnoughCapacity {
            instance: reservation.instance().to_string(),
            network_type: "manual".to_string(),
            network: declared.name().to_string(),
        })
    }

    async fn reserve_vip(&self, reservation: &mut Reservation, vip: &VipNetwork) -> Result<(), ReservationError> {
        reservation.resolve_type(ReservationType::Static);

        if reservation.ip().is_some() {
            self.ip_repo.add(reservation).await?;
            reservation.mark_reserved();
            return Ok(());
        }

        for subnet in &vip.subnets {
            if let Some(ip) = self.ip_repo.allocate_vip_ip(reservation, subnet).await? {
                reservation.resolve_ip(ip);
                reservation.mark_reserved();
                return Ok(());
            }
        }

        Err(ReservationError::NotEnoughCapacity {
            instance: reservation.instance().to_string(),
            network_type: "vip".to_string(),
            network: vip.name.clone(),
        })
    }

    fn reserve_dynamic(reservation: &mut Reservation) -> Result<(), ReservationError> {
        if reservation.is_static() {
            return Err(ReservationError::InvalidType {
                network: reservation.network().name().to_string(),
                reason: "static IPs are not supported on dynamic networks".to_string(),
            });
        }
        reservation.resolve_type(ReservationType::Dynamic);
        reservation.mark_reserved();
        Ok(())
    }

    async fn try_reserve_existing(&self, reservation: &mut Reservation) -> Result<(), ReservationError> {
        let network = Arc::clone(reservation.network());
        let stored = reservation.existing_type();
        let expected = match network.as_ref() {
            Network::Manual(_) => ExistingNetworkType::Manual,
            Network::Dynamic(_) => ExistingNetworkType::Dynamic,
            Network::Vip(_) => ExistingNetworkType::Vip,
        };
        if let Some(stored) = stored.filter(|stored| *stored != expected) {
            return Err(ReservationError::InvalidType {
                network: network.name().to_string(),
                reason: format!("stored as {stored} but network is {expected}"),
            });
        }

        match network.as_ref() {
            Network::Dynamic(_) => {
                reservation.resolve_type(ReservationType::Dynamic);
                reservation.mark_reserved();
            }
            Network::Vip(_) => {
                reservation.resolve_type(ReservationType::Static);
                self.ip_repo.add(reservation).await?;
                reservation.mark_reserved();
            }
            Network::Manual(_) => {
                let ip = reservation.ip().ok_or(ReservationError::IpMissing)?;
                let subnet = network
                    .subnet_containing(&ip)
                    .ok_or_else(|| ReservationError::OutsideSubnet {
                        ip,
                        network: network.name().to_string(),
                    })?;
                if subnet.is_restricted(&ip) {
                    return Err(ReservationError::IpReserved {
                        ip,
                        network: network.name().to_string(),
                    });
                }
                reservation.resolve_type(if subnet.is_static(&ip) {
                    ReservationType::Static
                } else {
                    ReservationType::Dynamic
                });
                self.ip_repo.add(reservation).await?;
                reservation.mark_reserved();
            }
        }

        debug!("Kept existing reservation {}", reservation);
        Ok(())
    }

    /// Network owning the address: the declared network first, then the
    /// other configured networks in declaration order
    fn network_containing(&self, declared: &Arc<Network>, ip: &IpAddr) -> Option<Arc<Network>> {
        if declared.subnet_containing(ip).is_some() {
            return Some(Arc::clone(declared));
        }
        self.networks
            .iter()
            .filter(|network| network.name() != declared.name())
            .find(|network| network.subnet_containing(ip).is_some())
            .map(Arc::clone)
    }

    /// Subnets to try for dynamic allocation, the declared network's first
    fn candidate_subnets<'a>(
        &'a self,
        declared: &'a Arc<Network>,
        az: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a Arc<Network>, &'a ManualSubnet)> + 'a {
        let others = self
            .networks
            .iter()
            .filter(move |network| network.name() != declared.name());

        std::iter::once(declared)
            .chain(others)
            .flat_map(|network| network.manual_subnets().iter().map(move |subnet| (network, subnet)))
            .filter(move |(_, subnet)| subnet.serves_az(az))
    }
}
