// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rigid transform between two streams' coordinate frames.

use crate::error::{Error, Result};
use crate::topics::f32_array;
use serde_json::Value;

/// Rotation (column-major 3x3) followed by translation, in meters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extrinsics {
    pub rotation: [f32; 9],
    pub translation: [f32; 3],
}

impl Extrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }

    /// Parse `[r0..r8, t0..t2]`
    pub fn from_json(j: &Value) -> Result<Self> {
        let all: [f32; 12] = f32_array(j, "extrinsics")?;
        let mut rotation = [0f32; 9];
        let mut translation = [0f32; 3];
        rotation.copy_from_slice(&all[..9]);
        translation.copy_from_slice(&all[9..]);
        Ok(Self {
            rotation,
            translation,
        })
    }

    pub fn to_json(&self) -> Value {
        Value::from(
            self.rotation
                .iter()
                .chain(self.translation.iter())
                .map(|&f| Value::from(f))
                .collect::<Vec<_>>(),
        )
    }
}

/// One `[from, to, transform]` entry of a device header
pub(crate) fn triple_from_json(j: &Value) -> Result<(String, String, Extrinsics)> {
    let arr = j
        .as_array()
        .filter(|a| a.len() == 3)
        .ok_or_else(|| Error::malformed(format!("extrinsics entry must be [from, to, data]: {}", j)))?;
    let name = |idx: usize| -> Result<String> {
        arr[idx]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::malformed(format!("extrinsics stream name invalid: {}", j)))
    };
    Ok((name(0)?, name(1)?, Extrinsics::from_json(&arr[2])?))
}
