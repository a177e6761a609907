//! The bone-rotation string carried by bone messages.
//!
//! A rig's bones are flattened to euler angles, each component printed
//! with two decimals and terminated by `|`:
//!
//! ```text
//! "10.00|20.00|30.00|0.00|90.00|0.00|"   → two bones
//! ""                                     → no bones
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tether_protocol::Vec3;

use crate::RegistryError;

/// Euler angles (degrees) for each bone of a rig, in rig order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BonePose {
    pub bones: Vec<Vec3>,
}

impl BonePose {
    pub fn new(bones: Vec<Vec3>) -> Self {
        Self { bones }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Parses a bone string. The trailing `|` is optional.
    pub fn parse(s: &str) -> Result<Self, RegistryError> {
        let body = s.strip_suffix('|').unwrap_or(s);
        if body.is_empty() {
            return Ok(Self::default());
        }

        let components = body
            .split('|')
            .map(|part| part.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RegistryError::MalformedBones(format!("{e} in {s:?}")))?;

        if components.len() % 3 != 0 {
            return Err(RegistryError::MalformedBones(format!(
                "{} components is not a whole number of bones",
                components.len()
            )));
        }

        let bones = components
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect();
        Ok(Self { bones })
    }

    /// Formats as the wire bone string.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BonePose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.bones {
            write!(f, "{:.2}|{:.2}|{:.2}|", b.x, b.y, b.z)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for BonePose {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
