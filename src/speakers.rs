//! Virtual speaker layouts
//!
//! Each layout expands (or folds) one working-precision [`StereoOut32`] into a
//! fixed number of device channels. Layouts are generic over the device
//! precision ([`DeviceSample`]), so `Stereo51Out<i16>` and `Stereo51Out<i32>`
//! share one implementation.
//!
//! Two ingestion strategies exist for every layout:
//! - [`SpeakerFrame::resample_from`]: plain duplication/folding
//! - [`SpeakerFrame::adjust_from`]: the same mapping followed by per-speaker gain
//!
//! Center and LFE are derived as `(L + R) / 2`. No low-pass filtering is
//! applied; crossover is left to the speaker system.
//!
//! Adding a layout means adding one type implementing [`SpeakerFrame`] and one
//! [`SpeakerLayout`] variant.

use crate::sample::{DeviceSample, StereoOut16, StereoOut32};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Speaker positions present in a layout (WAVE channel mask bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpeakerMask: u32 {
        /// Front left
        const FRONT_LEFT = 0x001;
        /// Front right
        const FRONT_RIGHT = 0x002;
        /// Front center
        const FRONT_CENTER = 0x004;
        /// Subwoofer
        const LOW_FREQUENCY = 0x008;
        /// Back left
        const BACK_LEFT = 0x010;
        /// Back right
        const BACK_RIGHT = 0x020;
        /// Side left
        const SIDE_LEFT = 0x200;
        /// Side right
        const SIDE_RIGHT = 0x400;
    }
}

impl SpeakerMask {
    /// Front left + front right
    pub const STEREO: SpeakerMask = SpeakerMask::FRONT_LEFT.union(SpeakerMask::FRONT_RIGHT);
    /// Stereo + subwoofer
    pub const STEREO_21: SpeakerMask = SpeakerMask::STEREO.union(SpeakerMask::LOW_FREQUENCY);
    /// Front and back pairs
    pub const QUAD: SpeakerMask = SpeakerMask::STEREO
        .union(SpeakerMask::BACK_LEFT)
        .union(SpeakerMask::BACK_RIGHT);
    /// Quad + subwoofer
    pub const SURROUND_41: SpeakerMask = SpeakerMask::QUAD.union(SpeakerMask::LOW_FREQUENCY);
    /// Quad + center + subwoofer
    pub const SURROUND_51: SpeakerMask = SpeakerMask::SURROUND_41.union(SpeakerMask::FRONT_CENTER);
    /// 5.1 + side pair
    pub const SURROUND_71: SpeakerMask = SpeakerMask::SURROUND_51
        .union(SpeakerMask::SIDE_LEFT)
        .union(SpeakerMask::SIDE_RIGHT);
}

/// Per-speaker linear gains used by the volume-adjusting strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeAdjust {
    /// Front left gain
    pub front_left: f32,
    /// Front right gain
    pub front_right: f32,
    /// Center gain
    pub center: f32,
    /// Subwoofer gain
    pub lfe: f32,
    /// Back left gain
    pub back_left: f32,
    /// Back right gain
    pub back_right: f32,
    /// Side left gain
    pub side_left: f32,
    /// Side right gain
    pub side_right: f32,
}

impl VolumeAdjust {
    /// Unity gain on every speaker
    pub const UNITY: VolumeAdjust = VolumeAdjust {
        front_left: 1.0,
        front_right: 1.0,
        center: 1.0,
        lfe: 1.0,
        back_left: 1.0,
        back_right: 1.0,
        side_left: 1.0,
        side_right: 1.0,
    };

    /// Convert a decibel setting to a linear gain (`10^(dB / 10)`).
    pub fn db_to_gain(db: f32) -> f32 {
        10f32.powf(db / 10.0)
    }

    /// Build gains from per-speaker decibel settings, in
    /// FL, FR, C, LFE, BL, BR, SL, SR order.
    pub fn from_db(db: [f32; 8]) -> Self {
        VolumeAdjust {
            front_left: Self::db_to_gain(db[0]),
            front_right: Self::db_to_gain(db[1]),
            center: Self::db_to_gain(db[2]),
            lfe: Self::db_to_gain(db[3]),
            back_left: Self::db_to_gain(db[4]),
            back_right: Self::db_to_gain(db[5]),
            side_left: Self::db_to_gain(db[6]),
            side_right: Self::db_to_gain(db[7]),
        }
    }
}

impl Default for VolumeAdjust {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Capability shared by every output frame layout
pub trait SpeakerFrame: Copy + Default + Send + 'static {
    /// Device precision of each channel
    type Sample: DeviceSample;

    /// Number of interleaved channels
    const CHANNELS: usize;

    /// Speaker positions, in interleave order
    const MASK: SpeakerMask;

    /// Ingest one stereo sample by duplication/folding.
    fn resample_from(&mut self, src: StereoOut32);

    /// Ingest one stereo sample and apply per-speaker gains.
    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust);

    /// Write the channels into `out` in interleave order.
    ///
    /// `out` must hold at least [`Self::CHANNELS`] values.
    fn write_interleaved(&self, out: &mut [Self::Sample]);
}

#[inline]
fn sum(src: StereoOut32) -> i64 {
    src.left as i64 + src.right as i64
}

#[inline]
fn diff(src: StereoOut32) -> i64 {
    src.left as i64 - src.right as i64
}

impl SpeakerFrame for StereoOut16 {
    type Sample = i16;
    const CHANNELS: usize = 2;
    const MASK: SpeakerMask = SpeakerMask::STEREO;

    fn resample_from(&mut self, src: StereoOut32) {
        *self = src.downsample();
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.left = self.left.scaled(gains.front_left);
        self.right = self.right.scaled(gains.front_right);
    }

    fn write_interleaved(&self, out: &mut [i16]) {
        out[0] = self.left;
        out[1] = self.right;
    }
}

/// Working-precision passthrough: values are copied unchanged.
impl SpeakerFrame for StereoOut32 {
    type Sample = i32;
    const CHANNELS: usize = 2;
    const MASK: SpeakerMask = SpeakerMask::STEREO;

    fn resample_from(&mut self, src: StereoOut32) {
        *self = src;
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.left = src.left.scaled(gains.front_left);
        self.right = src.right.scaled(gains.front_right);
    }

    fn write_interleaved(&self, out: &mut [i32]) {
        out[0] = self.left;
        out[1] = self.right;
    }
}

/// Plain stereo at any device precision
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo20Out<S> {
    /// Front left
    pub left: S,
    /// Front right
    pub right: S,
}

impl<S: DeviceSample> SpeakerFrame for Stereo20Out<S> {
    type Sample = S;
    const CHANNELS: usize = 2;
    const MASK: SpeakerMask = SpeakerMask::STEREO;

    fn resample_from(&mut self, src: StereoOut32) {
        self.left = S::from_working(src.left as i64, 0);
        self.right = S::from_working(src.right as i64, 0);
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.left = self.left.scaled(gains.front_left);
        self.right = self.right.scaled(gains.front_right);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        out[..2].copy_from_slice(&[self.left, self.right]);
    }
}

/// Stereo plus subwoofer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo21Out<S> {
    /// Front left
    pub left: S,
    /// Front right
    pub right: S,
    /// Subwoofer
    pub lfe: S,
}

impl<S: DeviceSample> SpeakerFrame for Stereo21Out<S> {
    type Sample = S;
    const CHANNELS: usize = 3;
    const MASK: SpeakerMask = SpeakerMask::STEREO_21;

    fn resample_from(&mut self, src: StereoOut32) {
        self.left = S::from_working(src.left as i64, 0);
        self.right = S::from_working(src.right as i64, 0);
        self.lfe = S::from_working(sum(src), 1);
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.left = self.left.scaled(gains.front_left);
        self.right = self.right.scaled(gains.front_right);
        self.lfe = self.lfe.scaled(gains.lfe);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        out[..3].copy_from_slice(&[self.left, self.right, self.lfe]);
    }
}

/// Quadraphonic: front pair duplicated to the back pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo40Out<S> {
    /// Front left
    pub left: S,
    /// Front right
    pub right: S,
    /// Back left
    pub left_back: S,
    /// Back right
    pub right_back: S,
}

impl<S: DeviceSample> SpeakerFrame for Stereo40Out<S> {
    type Sample = S;
    const CHANNELS: usize = 4;
    const MASK: SpeakerMask = SpeakerMask::QUAD;

    fn resample_from(&mut self, src: StereoOut32) {
        self.left = S::from_working(src.left as i64, 0);
        self.right = S::from_working(src.right as i64, 0);
        self.left_back = self.left;
        self.right_back = self.right;
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.left = self.left.scaled(gains.front_left);
        self.right = self.right.scaled(gains.front_right);
        self.left_back = self.left_back.scaled(gains.back_left);
        self.right_back = self.right_back.scaled(gains.back_right);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        out[..4].copy_from_slice(&[self.left, self.right, self.left_back, self.right_back]);
    }
}

/// Quad plus subwoofer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo41Out<S> {
    /// Front left
    pub left: S,
    /// Front right
    pub right: S,
    /// Subwoofer
    pub lfe: S,
    /// Back left
    pub left_back: S,
    /// Back right
    pub right_back: S,
}

impl<S: DeviceSample> SpeakerFrame for Stereo41Out<S> {
    type Sample = S;
    const CHANNELS: usize = 5;
    const MASK: SpeakerMask = SpeakerMask::SURROUND_41;

    fn resample_from(&mut self, src: StereoOut32) {
        self.left = S::from_working(src.left as i64, 0);
        self.right = S::from_working(src.right as i64, 0);
        self.lfe = S::from_working(sum(src), 1);
        self.left_back = self.left;
        self.right_back = self.right;
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.left = self.left.scaled(gains.front_left);
        self.right = self.right.scaled(gains.front_right);
        self.lfe = self.lfe.scaled(gains.lfe);
        self.left_back = self.left_back.scaled(gains.back_left);
        self.right_back = self.right_back.scaled(gains.back_right);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        out[..5].copy_from_slice(&[
            self.left,
            self.right,
            self.lfe,
            self.left_back,
            self.right_back,
        ]);
    }
}

/// Six-channel frame shared by the 5.1 layouts
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Surround51<S> {
    /// Front left
    pub left: S,
    /// Front right
    pub right: S,
    /// Front center
    pub center: S,
    /// Subwoofer
    pub lfe: S,
    /// Back left
    pub left_back: S,
    /// Back right
    pub right_back: S,
}

impl<S: DeviceSample> Surround51<S> {
    fn apply_gains(&mut self, gains: &VolumeAdjust) {
        self.left = self.left.scaled(gains.front_left);
        self.right = self.right.scaled(gains.front_right);
        self.center = self.center.scaled(gains.center);
        self.lfe = self.lfe.scaled(gains.lfe);
        self.left_back = self.left_back.scaled(gains.back_left);
        self.right_back = self.right_back.scaled(gains.back_right);
    }

    fn write(&self, out: &mut [S]) {
        out[..6].copy_from_slice(&[
            self.left,
            self.right,
            self.center,
            self.lfe,
            self.left_back,
            self.right_back,
        ]);
    }
}

/// 5.1 by duplication: center and LFE carry the mono fold
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo51Out<S>(pub Surround51<S>);

impl<S: DeviceSample> SpeakerFrame for Stereo51Out<S> {
    type Sample = S;
    const CHANNELS: usize = 6;
    const MASK: SpeakerMask = SpeakerMask::SURROUND_51;

    fn resample_from(&mut self, src: StereoOut32) {
        let f = &mut self.0;
        f.left = S::from_working(src.left as i64, 0);
        f.right = S::from_working(src.right as i64, 0);
        f.center = S::from_working(sum(src), 1);
        f.lfe = f.center;
        f.left_back = f.left;
        f.right_back = f.right;
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.0.apply_gains(gains);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        self.0.write(out);
    }
}

/// 5.1 through a passive Pro Logic matrix: mono surround `(L - R) / 2`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo51OutDpl<S>(pub Surround51<S>);

impl<S: DeviceSample> SpeakerFrame for Stereo51OutDpl<S> {
    type Sample = S;
    const CHANNELS: usize = 6;
    const MASK: SpeakerMask = SpeakerMask::SURROUND_51;

    fn resample_from(&mut self, src: StereoOut32) {
        let f = &mut self.0;
        f.left = S::from_working(src.left as i64, 0);
        f.right = S::from_working(src.right as i64, 0);
        f.center = S::from_working(sum(src), 1);
        f.lfe = f.center;
        f.left_back = S::from_working(diff(src), 1);
        f.right_back = f.left_back;
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.0.apply_gains(gains);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        self.0.write(out);
    }
}

/// 5.1 through a passive Pro Logic II style matrix
///
/// Fronts have half the center removed, and the surrounds form an
/// anti-phase stereo pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo51OutDplII<S>(pub Surround51<S>);

impl<S: DeviceSample> SpeakerFrame for Stereo51OutDplII<S> {
    type Sample = S;
    const CHANNELS: usize = 6;
    const MASK: SpeakerMask = SpeakerMask::SURROUND_51;

    fn resample_from(&mut self, src: StereoOut32) {
        let (l, r) = (src.left as i64, src.right as i64);
        let f = &mut self.0;
        f.left = S::from_working(4 * l - (l + r), 2);
        f.right = S::from_working(4 * r - (l + r), 2);
        f.center = S::from_working(l + r, 1);
        f.lfe = f.center;
        f.left_back = S::from_working(l - r, 1);
        f.right_back = S::from_working(r - l, 1);
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.0.apply_gains(gains);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        self.0.write(out);
    }
}

/// 7.1: 5.1 duplication plus half-level side pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stereo71Out<S> {
    /// Front, center, LFE and back channels
    pub base: Surround51<S>,
    /// Side left
    pub left_side: S,
    /// Side right
    pub right_side: S,
}

impl<S: DeviceSample> SpeakerFrame for Stereo71Out<S> {
    type Sample = S;
    const CHANNELS: usize = 8;
    const MASK: SpeakerMask = SpeakerMask::SURROUND_71;

    fn resample_from(&mut self, src: StereoOut32) {
        let mut front = Stereo51Out::<S>::default();
        front.resample_from(src);
        self.base = front.0;
        self.left_side = S::from_working(src.left as i64, 1);
        self.right_side = S::from_working(src.right as i64, 1);
    }

    fn adjust_from(&mut self, src: StereoOut32, gains: &VolumeAdjust) {
        self.resample_from(src);
        self.base.apply_gains(gains);
        self.left_side = self.left_side.scaled(gains.side_left);
        self.right_side = self.right_side.scaled(gains.side_right);
    }

    fn write_interleaved(&self, out: &mut [S]) {
        self.base.write(out);
        out[6] = self.left_side;
        out[7] = self.right_side;
    }
}

/// 16-bit 2.1
pub type Stereo21Out16 = Stereo21Out<i16>;
/// 16-bit quad
pub type Stereo40Out16 = Stereo40Out<i16>;
/// 16-bit 4.1
pub type Stereo41Out16 = Stereo41Out<i16>;
/// 16-bit 5.1
pub type Stereo51Out16 = Stereo51Out<i16>;
/// 16-bit 5.1 Pro Logic
pub type Stereo51Out16Dpl = Stereo51OutDpl<i16>;
/// 16-bit 5.1 Pro Logic II
pub type Stereo51Out16DplII = Stereo51OutDplII<i16>;
/// 16-bit 7.1
pub type Stereo71Out16 = Stereo71Out<i16>;
/// 32-bit stereo
pub type Stereo20Out32 = Stereo20Out<i32>;
/// 32-bit 2.1
pub type Stereo21Out32 = Stereo21Out<i32>;
/// 32-bit quad
pub type Stereo40Out32 = Stereo40Out<i32>;
/// 32-bit 4.1
pub type Stereo41Out32 = Stereo41Out<i32>;
/// 32-bit 5.1
pub type Stereo51Out32 = Stereo51Out<i32>;
/// 32-bit 5.1 Pro Logic
pub type Stereo51Out32Dpl = Stereo51OutDpl<i32>;
/// 32-bit 5.1 Pro Logic II
pub type Stereo51Out32DplII = Stereo51OutDplII<i32>;
/// 32-bit 7.1
pub type Stereo71Out32 = Stereo71Out<i32>;

/// Runtime selection of the output speaker layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerLayout {
    /// 2.0
    #[default]
    Stereo,
    /// 2.1
    Stereo21,
    /// 4.0
    Quad,
    /// 4.1
    Surround41,
    /// 5.1 by duplication
    Surround51,
    /// 5.1 Pro Logic matrix
    Surround51Dpl,
    /// 5.1 Pro Logic II matrix
    #[serde(rename = "surround51_dpl2")]
    Surround51DplII,
    /// 7.1
    Surround71,
}

impl SpeakerLayout {
    /// Number of interleaved channels
    pub fn channels(self) -> usize {
        match self {
            SpeakerLayout::Stereo => 2,
            SpeakerLayout::Stereo21 => 3,
            SpeakerLayout::Quad => 4,
            SpeakerLayout::Surround41 => 5,
            SpeakerLayout::Surround51
            | SpeakerLayout::Surround51Dpl
            | SpeakerLayout::Surround51DplII => 6,
            SpeakerLayout::Surround71 => 8,
        }
    }

    /// Speaker positions present in this layout
    pub fn mask(self) -> SpeakerMask {
        match self {
            SpeakerLayout::Stereo => SpeakerMask::STEREO,
            SpeakerLayout::Stereo21 => SpeakerMask::STEREO_21,
            SpeakerLayout::Quad => SpeakerMask::QUAD,
            SpeakerLayout::Surround41 => SpeakerMask::SURROUND_41,
            SpeakerLayout::Surround51
            | SpeakerLayout::Surround51Dpl
            | SpeakerLayout::Surround51DplII => SpeakerMask::SURROUND_51,
            SpeakerLayout::Surround71 => SpeakerMask::SURROUND_71,
        }
    }
}
