use std::collections::HashMap;

use log::warn;

use super::commands::ApertureTemplate;

/// Aperture table built from `%AD` commands. Dimensions are stored in mm
/// (inch files are scaled when the definition is recorded).
#[derive(Debug, Default)]
pub struct ApertureTable {
    apertures: HashMap<u32, ApertureTemplate>,
}

impl ApertureTable {
    pub fn define(&mut self, code: u32, template: ApertureTemplate) {
        self.apertures.insert(code, template);
    }

    pub fn get(&self, code: u32) -> Option<&ApertureTemplate> {
        self.apertures.get(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.apertures.is_empty()
    }

    /// Width swept by a D01 draw with this aperture. Circles sweep their
    /// diameter; rectangles and oblongs their minimum dimension. Macro
    /// apertures don't sweep — draws with them are dropped upstream.
    pub fn stroke_width(&self, code: u32) -> f64 {
        match self.apertures.get(&code) {
            Some(ApertureTemplate::Circle { diameter }) => *diameter,
            Some(ApertureTemplate::Rect { w, h }) => w.min(*h),
            Some(ApertureTemplate::Oblong { w, h }) => w.min(*h),
            Some(ApertureTemplate::Macro { .. }) => 0.0,
            None => {
                warn!("draw with undefined aperture D{code}, using zero width");
                0.0
            }
        }
    }
}
