pub mod batch_cmd;
pub mod call_cmd;
pub mod inspect_cmd;
pub mod lookup_cmd;
pub mod mask_cmd;

pub use batch_cmd::cmd_batch;
pub use call_cmd::{cmd_call, cmd_geoip};
pub use inspect_cmd::cmd_inspect;
pub use lookup_cmd::cmd_lookup;
pub use mask_cmd::cmd_mask;

use anyhow::{bail, Result};
use geoql::{Engine, EngineState};

/// Fail early with the open error instead of one `NotInitialized` per address
pub(crate) fn ensure_ready(engine: &Engine) -> Result<()> {
    match engine.state() {
        EngineState::Ready(_) => Ok(()),
        EngineState::Failed(reason) => bail!("geoql is not initialized: {}", reason),
        EngineState::Uninitialized => bail!("geoql is not initialized"),
    }
}
