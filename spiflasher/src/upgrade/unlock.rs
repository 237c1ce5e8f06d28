//! Unlock handshake.

use log::{debug, info};

use crate::error::Result;
use crate::protocol::{StatusByte, UNLOCK_CMD};
use crate::transport::{InputLine, SpiBus};
use crate::upgrade::status::StatusChannel;

/// Send the unlock command and return the status that follows it.
///
/// The status is handed back as-is; deciding whether it is acceptable is
/// up to the caller.
pub fn unlock<S: SpiBus, R: InputLine>(
    channel: &mut StatusChannel<'_, S, R>,
) -> Result<StatusByte> {
    info!("Send unlock command");
    channel.write(&UNLOCK_CMD)?;

    let status = channel.read_status()?;
    debug!("Unlock status {status}");
    Ok(status)
}
