//! Output selection: connector, encoder, CRTC and mode

use log::{debug, info};

use crate::backend::device::{
    Connection, Connector, ConnectorId, CrtcId, EncoderId, ModeInfo, ModeSetting,
};
use crate::backend::error::SetupError;

/// The chosen scanout path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSelection {
    pub connector: ConnectorId,
    pub encoder: EncoderId,
    pub crtc: CrtcId,
    pub mode: ModeInfo,
}

/// Walk the card's resources and pick a scanout path.
///
/// The first connected connector with at least one mode wins. Its bound
/// encoder must be driven by a CRTC; the CRTC's active mode is kept if the
/// connector lists it, otherwise the connector's first mode is used.
pub fn select_output<K: ModeSetting + ?Sized>(kms: &K) -> Result<OutputSelection, SetupError> {
    let resources = kms.resources().map_err(SetupError::Resources)?;

    let connector = resources
        .connectors
        .iter()
        .filter_map(|id| kms.connector(*id))
        .find(|c| c.connection == Connection::Connected && !c.modes.is_empty())
        .ok_or(SetupError::NoConnector)?;

    let encoder = resources
        .encoders
        .iter()
        .filter_map(|id| kms.encoder(*id))
        .find(|e| Some(e.id) == connector.encoder_id)
        .ok_or(SetupError::NoEncoder)?;

    let crtc_id = encoder.crtc_id.ok_or(SetupError::NoCrtc)?;
    let crtc = kms.crtc(crtc_id).ok_or(SetupError::CrtcQuery)?;

    let mode = match crtc.mode {
        Some(active) if connector.modes.contains(&active) => active,
        _ => connector.modes[0],
    };

    for line in mode_listing(&connector, &mode) {
        info!("{}", line);
    }

    Ok(OutputSelection {
        connector: connector.id,
        encoder: encoder.id,
        crtc: crtc.id,
        mode,
    })
}

/// One line per connector mode, the chosen one marked with `>>`
pub fn mode_listing(connector: &Connector, chosen: &ModeInfo) -> Vec<String> {
    connector
        .modes
        .iter()
        .enumerate()
        .map(|(i, mode)| {
            let marker = if mode == chosen { ">>" } else { "  " };
            let (width, height) = mode.size();
            let preferred = if mode.is_preferred() { " preferred" } else { "" };
            format!(
                "{} {}. {}x{}@{}{}",
                marker, i, width, height, mode.vrefresh, preferred
            )
        })
        .collect()
}

/// Selected scanout path of one output
///
/// A failed setup leaves nothing selected.
#[derive(Debug, Default)]
pub struct KmsOutput {
    selection: Option<OutputSelection>,
}

impl KmsOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setup<K: ModeSetting + ?Sized>(
        &mut self,
        kms: &K,
    ) -> Result<&OutputSelection, SetupError> {
        self.selection = None;
        let selection = select_output(kms)?;
        debug!(
            "Selected connector {:?} encoder {:?} crtc {:?}",
            selection.connector, selection.encoder, selection.crtc
        );
        Ok(self.selection.insert(selection))
    }

    pub fn selection(&self) -> Option<&OutputSelection> {
        self.selection.as_ref()
    }

    pub fn mode(&self) -> Option<&ModeInfo> {
        self.selection.as_ref().map(|s| &s.mode)
    }

    pub fn clear(&mut self) {
        self.selection = None;
    }
}
