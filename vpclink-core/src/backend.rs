//! Boundary to the external provisioning system

use crate::error::Result;
use crate::plan::Plan;

/// Materializes a finalized plan
///
/// Implementations create the resources and resolve every late-bound
/// attribute of the plan exactly once.
pub trait ProvisioningBackend {
    fn provision(&self, plan: &Plan) -> Result<()>;
}

/// Backend that touches nothing and resolves attributes to deterministic,
/// realistic-looking values. Used for dry runs and tests.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    domain: String,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            domain: "amazonaws.com".to_string(),
        }
    }

    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningBackend for SimulatedBackend {
    fn provision(&self, plan: &Plan) -> Result<()> {
        let entities = plan.entities();

        for lb in &entities.load_balancers {
            let prefix = if lb.internal { "internal-" } else { "" };
            let dns = format!(
                "{}{}-{:08x}.elb.{}.{}",
                prefix,
                lb.name.to_lowercase(),
                fingerprint(&[plan.name(), &lb.name]) as u32,
                plan.region(),
                self.domain
            );
            lb.dns_name.resolve(dns)?;
        }

        for route in &entities.proxy_routes {
            let url = format!(
                "https://{}.execute-api.{}.{}/{}/",
                api_id(fingerprint(&[plan.name(), &route.name])),
                plan.region(),
                self.domain,
                route.stage
            );
            route.endpoint().resolve(url)?;
        }

        tracing::info!(
            "Simulated provisioning of {} ({} load balancer(s), {} route(s))",
            plan.name(),
            entities.load_balancers.len(),
            entities.proxy_routes.len()
        );
        Ok(())
    }
}

/// FNV-1a over the parts, separated so that ("ab", "c") != ("a", "bc")
fn fingerprint(parts: &[&str]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for part in parts {
        for byte in part.bytes().chain(std::iter::once(0)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}

/// Ten lowercase base-36 characters
fn api_id(mut hash: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    (0..10)
        .map(|_| {
            let c = ALPHABET[(hash % 36) as usize] as char;
            hash /= 36;
            c
        })
        .collect()
}
