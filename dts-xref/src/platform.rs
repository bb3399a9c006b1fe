//! SoC vendor detection and the vendor-specific pin number decoders.

use std::fmt;

use crate::resolve::{cells, COMPATIBLE};
use crate::tree::Tree;

/// Vendor family, which decides how pin numbers are packed in pinctrl groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// `pins = "gpio24", "gpio25";`
    Qualcomm,
    /// `pins = <0x1802>;`, the pin number sits in bits 8..16.
    Mediatek,
    /// `pins = <0x00234567 0x1 …>;` as pairs, the pin number sits in bits 20..32 of
    /// the first word of each pair.
    Spreadtrum,
}

/// Markers searched for in the root `compatible`, in priority order.
const MARKERS: [(Platform, &[&str]); 3] = [
    (Platform::Qualcomm, &["qcom"]),
    (Platform::Mediatek, &["mediatek", "mtk"]),
    (Platform::Spreadtrum, &["sprd", "spreadtrum"]),
];

impl Platform {
    /// Classify a tree by the `compatible` property of its root node.
    pub fn detect(tree: &Tree) -> Option<Self> {
        Self::from_compatible(tree.node(tree.root()).prop(COMPATIBLE)?)
    }

    /// Classify a `compatible` value by case-insensitive substring match.
    pub fn from_compatible(compatible: &str) -> Option<Self> {
        let compatible = compatible.to_ascii_lowercase();

        MARKERS
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| compatible.contains(m)))
            .map(|&(platform, _)| platform)
    }

    /// Decode the pin numbers configured by one property of a pinctrl group.
    ///
    /// Properties that are not a pin specification for this platform yield nothing.
    pub fn decode_pins(self, key: &str, value: &str) -> Vec<u32> {
        match self {
            Platform::Qualcomm if key == "pins" => value
                .split(',')
                .filter_map(|item| {
                    item.trim()
                        .strip_prefix("\"gpio")?
                        .strip_suffix('"')?
                        .parse()
                        .ok()
                })
                .collect(),
            Platform::Mediatek if key == "pins" || key == "pinmux" => match cells(value) {
                Some(cells) if key == "pinmux" || cells.len() == 1 => {
                    cells.into_iter().map(|v| (v >> 8) & 0xff).collect()
                }
                _ => Vec::new(),
            },
            Platform::Spreadtrum if key == "pins" => cells(value)
                .unwrap_or_default()
                .into_iter()
                .step_by(2)
                .map(|v| (v >> 20) & 0xfff)
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Qualcomm => "Qualcomm",
            Platform::Mediatek => "MediaTek",
            Platform::Spreadtrum => "Spreadtrum",
        };
        f.write_str(name)
    }
}
