//! Display device discovery.
//!
//! Opens the device, picks the first connected output and remembers what its display
//! controller was showing so that teardown can put it back.

use std::fs;
use std::path::{Path, PathBuf};

use smithay::reexports::drm::control::{crtc, encoder};
use tracing::{debug, trace, warn};

use super::error::InitError;
use super::platform::{KmsDevice, Platform};
use super::types::{ConnectorInfo, CrtcState, DeviceSelection, DisplayResources, DisplayTarget};

pub fn open_device<P: Platform>(platform: &P, path: &Path) -> Result<P::Device, InitError> {
    debug!("opening display device {path:?}");
    platform
        .open_device(path)
        .map_err(|source| InitError::DeviceOpen {
            path: path.to_owned(),
            source,
        })
}

pub fn fetch_resources<D: KmsDevice>(device: &D) -> Result<DisplayResources, InitError> {
    let resources = device.fetch_resources().map_err(InitError::ResourceQuery)?;
    trace!(
        "display resources: {} connectors, {} encoders, {} crtcs",
        resources.connectors.len(),
        resources.encoders.len(),
        resources.crtcs.len(),
    );
    Ok(resources)
}

/// Returns the first connector, in enumeration order, that has a display attached.
///
/// There is no scoring among several connected outputs, so which one wins depends on the
/// order the driver lists them in.
pub fn find_connected_output<D: KmsDevice>(
    device: &D,
    resources: &DisplayResources,
) -> Result<ConnectorInfo, InitError> {
    for &handle in &resources.connectors {
        match device.connector(handle) {
            Ok(info) if info.connected => return Ok(info),
            Ok(_) => trace!("skipping disconnected connector {handle:?}"),
            Err(err) => warn!("error getting connector {handle:?}: {err:?}"),
        }
    }

    Err(InitError::NoConnectedOutput)
}

pub fn find_encoder<D: KmsDevice>(
    device: &D,
    connector: &ConnectorInfo,
) -> Result<(encoder::Handle, crtc::Handle), InitError> {
    let encoder = connector
        .encoder
        .ok_or(InitError::NoEncoder(connector.handle))?;
    let crtc = device
        .encoder_controller(encoder)
        .map_err(InitError::ResourceQuery)?
        .ok_or(InitError::NoController(encoder))?;
    Ok((encoder, crtc))
}

pub fn snapshot_controller<D: KmsDevice>(
    device: &D,
    crtc: crtc::Handle,
) -> Result<CrtcState, InitError> {
    device
        .controller_state(crtc)
        .map_err(InitError::ResourceQuery)
}

/// Runs the whole discovery on an open device.
pub fn locate<D: KmsDevice>(device: &D) -> Result<DisplayTarget, InitError> {
    let _span = tracy_client::span!("locate");

    let connector = {
        let resources = fetch_resources(device)?;
        find_connected_output(device, &resources)?
    };
    let (encoder, crtc) = find_encoder(device, &connector)?;

    // The first listed mode is used as is. It is not necessarily the preferred one.
    let mode = *connector
        .modes
        .first()
        .ok_or(InitError::NoMode(connector.handle))?;

    let original = snapshot_controller(device, crtc)?;

    debug!(
        "using connector {:?} via encoder {encoder:?} on crtc {crtc:?}, mode {mode:?}",
        connector.handle
    );
    trace!("original crtc state: {original:?}");

    Ok(DisplayTarget {
        connector: connector.handle,
        crtc,
        mode,
        original,
    })
}

/// Device nodes to try, in order.
pub fn candidate_devices(selection: &DeviceSelection) -> Vec<PathBuf> {
    match selection {
        DeviceSelection::Fixed(path) => vec![path.clone()],
        DeviceSelection::Probe(dir) => match fs::read_dir(dir) {
            Ok(entries) => card_nodes(entries.filter_map(|entry| entry.ok()).map(|e| e.path())),
            Err(err) => {
                warn!("error reading {dir:?}: {err:?}");
                Vec::new()
            }
        },
    }
}

/// Keeps `cardN` nodes and sorts them by N.
fn card_nodes(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut nodes: Vec<(u32, PathBuf)> = paths
        .into_iter()
        .filter_map(|path| {
            let index = path
                .file_name()?
                .to_str()?
                .strip_prefix("card")?
                .parse()
                .ok()?;
            Some((index, path))
        })
        .collect();
    nodes.sort_by_key(|(index, _)| *index);
    nodes.into_iter().map(|(_, path)| path).collect()
}
