use std::sync::Arc;

use crate::buffer::PixelBuffer;
use crate::error::{ReelError, ReelResult};
use crate::job::ColorPreset;

/// Narrow interface over an external color-management configuration (an OCIO
/// config or similar). Space names must be enumerable so the input space can
/// be validated at setup time instead of guessed per frame.
pub trait ColorEngine: Send + Sync {
    fn space_names(&self) -> Vec<String>;

    /// Transform `buffer` in place from `input_space` to the engine's display
    /// output space.
    fn convert(&self, buffer: &mut PixelBuffer, input_space: &str) -> ReelResult<()>;
}

/// A fully resolved per-frame color transform. Resolution happens once at job
/// setup; applying is infallible for the fixed transfer functions and only
/// the managed path can fail per frame.
#[derive(Clone)]
pub enum ColorTransform {
    LinearToSrgb,
    LinearToRec709,
    SrgbToLinear,
    Passthrough,
    Managed {
        engine: Arc<dyn ColorEngine>,
        input_space: String,
    },
}

impl std::fmt::Debug for ColorTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LinearToSrgb => write!(f, "LinearToSrgb"),
            Self::LinearToRec709 => write!(f, "LinearToRec709"),
            Self::SrgbToLinear => write!(f, "SrgbToLinear"),
            Self::Passthrough => write!(f, "Passthrough"),
            Self::Managed { input_space, .. } => {
                write!(f, "Managed {{ input_space: {input_space:?} }}")
            }
        }
    }
}

impl ColorTransform {
    /// Resolve the configured preset against the explicit input space, the
    /// space detected from frame metadata, and the optional engine.
    ///
    /// A managed conversion with no resolvable input space is a job-fatal
    /// configuration error here, before any frame is read: a wrong guess
    /// would corrupt every frame identically.
    pub fn resolve(
        preset: ColorPreset,
        explicit_input: Option<&str>,
        detected_input: Option<&str>,
        engine: Option<Arc<dyn ColorEngine>>,
    ) -> ReelResult<Self> {
        match preset {
            ColorPreset::LinearToSrgb => Ok(Self::LinearToSrgb),
            ColorPreset::LinearToRec709 => Ok(Self::LinearToRec709),
            ColorPreset::SrgbToLinear => Ok(Self::SrgbToLinear),
            ColorPreset::Passthrough => Ok(Self::Passthrough),
            ColorPreset::Managed => {
                let engine = engine.ok_or_else(|| {
                    ReelError::config("managed color conversion requires a color engine")
                })?;
                let input_space = explicit_input
                    .or(detected_input)
                    .ok_or_else(|| {
                        ReelError::config(
                            "managed color conversion needs an input space: none configured \
                             and none detected in frame metadata",
                        )
                    })?
                    .to_string();
                let known = engine.space_names();
                if !known.iter().any(|s| s == &input_space) {
                    return Err(ReelError::config(format!(
                        "input color space '{input_space}' is not defined by the color engine"
                    )));
                }
                Ok(Self::Managed {
                    engine,
                    input_space,
                })
            }
        }
    }

    pub fn apply(&self, buffer: &mut PixelBuffer) -> ReelResult<()> {
        match self {
            Self::LinearToSrgb => {
                apply_to_color_channels(buffer, |v| linear_to_srgb(reinhard(v)));
                Ok(())
            }
            Self::LinearToRec709 => {
                apply_to_color_channels(buffer, |v| linear_to_rec709(reinhard(v)));
                Ok(())
            }
            Self::SrgbToLinear => {
                apply_to_color_channels(buffer, srgb_to_linear);
                Ok(())
            }
            Self::Passthrough => Ok(()),
            Self::Managed {
                engine,
                input_space,
            } => engine.convert(buffer, input_space),
        }
    }
}

/// Alpha (a 4th channel) passes through untouched.
fn apply_to_color_channels(buffer: &mut PixelBuffer, f: impl Fn(f32) -> f32) {
    let c = buffer.channels as usize;
    let color_c = c.min(3);
    for px in buffer.data.chunks_exact_mut(c) {
        for v in &mut px[..color_c] {
            *v = f(*v);
        }
    }
}

/// Simple Reinhard operator to bring HDR values into displayable range.
fn reinhard(v: f32) -> f32 {
    let v = v.max(0.0);
    v / (1.0 + v)
}

fn linear_to_srgb(v: f32) -> f32 {
    let v = v.max(0.0);
    let out = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    out.clamp(0.0, 1.0)
}

fn linear_to_rec709(v: f32) -> f32 {
    let v = v.max(0.0);
    let out = if v < 0.018 {
        v * 4.5
    } else {
        1.099 * v.powf(0.45) - 0.099
    };
    out.clamp(0.0, 1.0)
}

fn srgb_to_linear(v: f32) -> f32 {
    let v = v.clamp(0.0, 1.0);
    if v <= 0.040_45 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEngine {
        spaces: Vec<String>,
    }

    impl ColorEngine for FakeEngine {
        fn space_names(&self) -> Vec<String> {
            self.spaces.clone()
        }

        fn convert(&self, buffer: &mut PixelBuffer, _input_space: &str) -> ReelResult<()> {
            for v in &mut buffer.data {
                *v *= 0.5;
            }
            Ok(())
        }
    }

    fn engine() -> Arc<dyn ColorEngine> {
        Arc::new(FakeEngine {
            spaces: vec!["ACES - ACEScg".into(), "sRGB".into()],
        })
    }

    #[test]
    fn managed_without_input_space_fails_at_setup() {
        let err = ColorTransform::resolve(ColorPreset::Managed, None, None, Some(engine()))
            .unwrap_err();
        assert!(matches!(err, ReelError::Config(_)));
    }

    #[test]
    fn managed_with_unknown_space_fails_at_setup() {
        let err =
            ColorTransform::resolve(ColorPreset::Managed, Some("NotASpace"), None, Some(engine()))
                .unwrap_err();
        assert!(matches!(err, ReelError::Config(_)));
    }

    #[test]
    fn managed_prefers_explicit_over_detected() {
        let t = ColorTransform::resolve(
            ColorPreset::Managed,
            Some("sRGB"),
            Some("ACES - ACEScg"),
            Some(engine()),
        )
        .unwrap();
        let ColorTransform::Managed { input_space, .. } = t else {
            panic!("expected managed transform");
        };
        assert_eq!(input_space, "sRGB");
    }

    #[test]
    fn srgb_round_trips_through_linear() {
        for v in [0.0f32, 0.02, 0.18, 0.5, 1.0] {
            let back = linear_to_srgb(srgb_to_linear(v));
            assert!((back - v).abs() < 1e-4, "{v} -> {back}");
        }
    }

    #[test]
    fn linear_to_srgb_tonemaps_hdr_into_range() {
        let mut buf = PixelBuffer::filled(2, 1, 3, [12.0, 0.18, 0.0, 0.0]).unwrap();
        ColorTransform::LinearToSrgb.apply(&mut buf).unwrap();
        for v in &buf.data {
            assert!((0.0..=1.0).contains(v));
        }
        // Bright values stay below 1.0 thanks to the tone map.
        assert!(buf.data[0] < 1.0);
    }

    #[test]
    fn alpha_channel_is_untouched() {
        let mut buf = PixelBuffer::filled(1, 1, 4, [0.5, 0.5, 0.5, 0.25]).unwrap();
        ColorTransform::LinearToSrgb.apply(&mut buf).unwrap();
        assert_eq!(buf.data[3], 0.25);
    }

    #[test]
    fn passthrough_is_identity() {
        let mut buf = PixelBuffer::filled(2, 2, 3, [3.0, -1.0, 0.5, 0.0]).unwrap();
        let before = buf.clone();
        ColorTransform::Passthrough.apply(&mut buf).unwrap();
        assert_eq!(buf, before);
    }
}
