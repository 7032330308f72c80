/*!
Generation of the telemetry identifier set
*/

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StateResult;

const MACHINE_ID_BYTES: usize = 32;
const MAC_MACHINE_ID_BYTES: usize = 64;
const DEVICE_ID_BYTES: usize = 16;
const SQM_ID_BYTES: usize = 64;

/// A freshly drawn set of identifiers. Only produced whole by [`IdentifierGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSet {
    machine_id: String,
    mac_machine_id: String,
    device_id: String,
    sqm_id: String,
}

impl IdentifierSet {
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn mac_machine_id(&self) -> &str {
        &self.mac_machine_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn sqm_id(&self) -> &str {
        &self.sqm_id
    }

    /// Keys under which the target application keeps these values in `storage.json`
    pub fn telemetry_entries(&self) -> [(&'static str, &str); 4] {
        [
            ("telemetry.machineId", &self.machine_id),
            ("telemetry.macMachineId", &self.mac_machine_id),
            ("telemetry.devDeviceId", &self.device_id),
            ("telemetry.sqmId", &self.sqm_id),
        ]
    }
}

pub struct IdentifierGenerator;

impl IdentifierGenerator {
    /// Draw a new set from the operating system's entropy source
    pub fn generate() -> StateResult<IdentifierSet> {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R) -> StateResult<IdentifierSet> {
        let machine_id = random_hex(rng, MACHINE_ID_BYTES)?;
        let mac_machine_id = random_hex(rng, MAC_MACHINE_ID_BYTES)?;
        let device_id = format_device_id(&random_hex(rng, DEVICE_ID_BYTES)?);
        let sqm_id = random_hex(rng, SQM_ID_BYTES)?;

        debug!("Generated identifier set with device id {}", device_id);
        Ok(IdentifierSet {
            machine_id,
            mac_machine_id,
            device_id,
            sqm_id,
        })
    }
}

fn random_hex<R: RngCore + ?Sized>(rng: &mut R, len: usize) -> StateResult<String> {
    let mut bytes = vec![0u8; len];
    rng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// 32 hex chars -> 8-4-4-4-12
fn format_device_id(raw: &str) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        &raw[..8],
        &raw[8..12],
        &raw[12..16],
        &raw[16..20],
        &raw[20..32]
    )
}
