// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream intrinsics (lens and IMU calibration).
//!
//! A video stream caches either one intrinsics set (scaled to every profile
//! by consumers) or, for legacy sources, one set per resolution. The cache is
//! keyed by `(width, height)`.

use crate::error::{Error, Result};
use crate::topics::{f32_array, field, u64_field};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";
const KEY_PRINCIPAL_POINT: &str = "principal-point";
const KEY_FOCAL_LENGTH: &str = "focal-length";
const KEY_MODEL: &str = "model";
const KEY_COEFFICIENTS: &str = "coefficients";
const KEY_ACCEL: &str = "accel";
const KEY_GYRO: &str = "gyro";
const KEY_DATA: &str = "data";
const KEY_NOISE_VARIANCES: &str = "noise-variances";
const KEY_BIAS_VARIANCES: &str = "bias-variances";

/// Pinhole camera intrinsics for one resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoIntrinsics {
    pub width: u32,
    pub height: u32,
    pub principal_point: [f32; 2],
    pub focal_length: [f32; 2],
    pub model: i32,
    pub coefficients: [f32; 5],
}

impl VideoIntrinsics {
    pub fn from_json(j: &Value) -> Result<Self> {
        if !j.is_object() {
            return Err(Error::malformed(format!("intrinsics must be an object: {}", j)));
        }
        let dim = |key: &str| -> Result<u32> {
            u32::try_from(u64_field(j, key)?)
                .map_err(|_| Error::malformed(format!("intrinsics {} out of range", key)))
        };
        let mut intr = Self {
            width: dim(KEY_WIDTH)?,
            height: dim(KEY_HEIGHT)?,
            principal_point: f32_array(field(j, KEY_PRINCIPAL_POINT)?, KEY_PRINCIPAL_POINT)?,
            focal_length: f32_array(field(j, KEY_FOCAL_LENGTH)?, KEY_FOCAL_LENGTH)?,
            model: 0,
            coefficients: [0.0; 5],
        };
        intr.override_distortion(j)?;
        Ok(intr)
    }

    fn override_distortion(&mut self, j: &Value) -> Result<()> {
        if let Some(model) = j.get(KEY_MODEL) {
            self.model = model
                .as_i64()
                .and_then(|m| i32::try_from(m).ok())
                .ok_or_else(|| Error::malformed(format!("intrinsics model invalid: {}", model)))?;
        }
        if let Some(coeffs) = j.get(KEY_COEFFICIENTS) {
            self.coefficients = f32_array(coeffs, KEY_COEFFICIENTS)?;
        }
        Ok(())
    }

    /// Apply a partial update; width and height never change
    pub fn override_from_json(&mut self, j: &Value) -> Result<()> {
        if !j.is_object() {
            return Err(Error::malformed(format!("intrinsics must be an object: {}", j)));
        }
        let mut updated = *self;
        if let Some(pp) = j.get(KEY_PRINCIPAL_POINT) {
            updated.principal_point = f32_array(pp, KEY_PRINCIPAL_POINT)?;
        }
        if let Some(fl) = j.get(KEY_FOCAL_LENGTH) {
            updated.focal_length = f32_array(fl, KEY_FOCAL_LENGTH)?;
        }
        updated.override_distortion(j)?;
        *self = updated;
        Ok(())
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn to_json(&self) -> Value {
        json!({
            KEY_WIDTH: self.width,
            KEY_HEIGHT: self.height,
            KEY_PRINCIPAL_POINT: self.principal_point,
            KEY_FOCAL_LENGTH: self.focal_length,
            KEY_MODEL: self.model,
            KEY_COEFFICIENTS: self.coefficients,
        })
    }
}

/// IMU intrinsics for one sensor (accelerometer or gyro)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionIntrinsics {
    /// Scale and bias, 3 rows of `[scale_x, scale_y, scale_z, bias]`
    pub data: [[f32; 4]; 3],
    pub noise_variances: [f32; 3],
    pub bias_variances: [f32; 3],
}

impl MotionIntrinsics {
    pub fn from_json(j: &Value) -> Result<Self> {
        let rows = field(j, KEY_DATA)?
            .as_array()
            .filter(|rows| rows.len() == 3)
            .ok_or_else(|| Error::malformed("motion intrinsics data must have 3 rows"))?;
        let mut data = [[0f32; 4]; 3];
        for (out, row) in data.iter_mut().zip(rows) {
            *out = f32_array(row, KEY_DATA)?;
        }
        let variances = |key: &str| -> Result<[f32; 3]> {
            j.get(key).map_or(Ok([0.0; 3]), |v| f32_array(v, key))
        };
        Ok(Self {
            data,
            noise_variances: variances(KEY_NOISE_VARIANCES)?,
            bias_variances: variances(KEY_BIAS_VARIANCES)?,
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            KEY_DATA: self.data,
            KEY_NOISE_VARIANCES: self.noise_variances,
            KEY_BIAS_VARIANCES: self.bias_variances,
        })
    }
}

/// Intrinsics cached on a stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamIntrinsics {
    /// One entry per resolution (a single entry for modern devices)
    Video(BTreeMap<(u32, u32), VideoIntrinsics>),
    Motion {
        accel: MotionIntrinsics,
        gyro: MotionIntrinsics,
    },
}

impl StreamIntrinsics {
    /// Parse a video stream's intrinsics: one object or an array of them
    pub fn video_from_json(j: &Value) -> Result<Self> {
        let mut set = BTreeMap::new();
        if let Some(arr) = j.as_array() {
            for ij in arr {
                let intr = VideoIntrinsics::from_json(ij)?;
                if set.insert(intr.resolution(), intr).is_some() {
                    return Err(Error::malformed(format!(
                        "width & height specified twice: {}",
                        ij
                    )));
                }
            }
        } else {
            let intr = VideoIntrinsics::from_json(j)?;
            set.insert(intr.resolution(), intr);
        }
        Ok(Self::Video(set))
    }

    /// Parse a motion stream's intrinsics: `{ accel, gyro }`
    pub fn motion_from_json(j: &Value) -> Result<Self> {
        Ok(Self::Motion {
            accel: MotionIntrinsics::from_json(field(j, KEY_ACCEL)?)?,
            gyro: MotionIntrinsics::from_json(field(j, KEY_GYRO)?)?,
        })
    }

    /// Video intrinsics for a resolution, if cached
    pub fn video(&self, width: u32, height: u32) -> Option<&VideoIntrinsics> {
        match self {
            Self::Video(set) => set.get(&(width, height)),
            Self::Motion { .. } => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Video(set) if set.len() == 1 => set
                .values()
                .next()
                .map(VideoIntrinsics::to_json)
                .unwrap_or(Value::Null),
            Self::Video(set) => Value::Array(set.values().map(VideoIntrinsics::to_json).collect()),
            Self::Motion { accel, gyro } => json!({
                KEY_ACCEL: accel.to_json(),
                KEY_GYRO: gyro.to_json(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intr_json(w: u32, h: u32, fx: f32) -> Value {
        json!({
            "width": w,
            "height": h,
            "principal-point": [w as f32 / 2.0, h as f32 / 2.0],
            "focal-length": [fx, fx],
        })
    }

    #[test]
    fn test_video_intrinsics_parse() {
        let intr = VideoIntrinsics::from_json(&intr_json(640, 480, 380.0)).unwrap();
        assert_eq!(intr.resolution(), (640, 480));
        assert_eq!(intr.principal_point, [320.0, 240.0]);
        assert_eq!(intr.model, 0);
        assert!(VideoIntrinsics::from_json(&json!({ "width": 640 })).is_err());
        assert!(VideoIntrinsics::from_json(&json!([640, 480])).is_err());
    }

    #[test]
    fn test_override_keeps_resolution() {
        let mut intr = VideoIntrinsics::from_json(&intr_json(640, 480, 380.0)).unwrap();
        intr.override_from_json(&json!({ "focal-length": [400.0, 401.0], "width": 1 }))
            .unwrap();
        assert_eq!(intr.focal_length, [400.0, 401.0]);
        assert_eq!(intr.resolution(), (640, 480));

        // A bad field leaves everything untouched
        assert!(intr
            .override_from_json(&json!({ "focal-length": [1.0, 1.0], "model": "x" }))
            .is_err());
        assert_eq!(intr.focal_length, [400.0, 401.0]);
    }

    #[test]
    fn test_stream_intrinsics_array() {
        let j = json!([intr_json(640, 480, 380.0), intr_json(1280, 720, 640.0)]);
        let intr = StreamIntrinsics::video_from_json(&j).unwrap();
        assert!(intr.video(1280, 720).is_some());
        assert!(intr.video(848, 480).is_none());

        let dup = json!([intr_json(640, 480, 380.0), intr_json(640, 480, 390.0)]);
        assert!(StreamIntrinsics::video_from_json(&dup).is_err());
    }

    #[test]
    fn test_motion_intrinsics() {
        let m = json!({ "data": [[1, 0, 0, 0.1], [0, 1, 0, 0.2], [0, 0, 1, 0.3]] });
        let intr = StreamIntrinsics::motion_from_json(&json!({ "accel": m, "gyro": m })).unwrap();
        match intr {
            StreamIntrinsics::Motion { accel, gyro } => {
                assert_eq!(accel.data[2][3], 0.3);
                assert_eq!(gyro.noise_variances, [0.0; 3]);
            }
            StreamIntrinsics::Video(_) => panic!("expected motion intrinsics"),
        }
        assert!(StreamIntrinsics::motion_from_json(&json!({ "accel": m })).is_err());
    }
}
