//! Visual regression testing with screenshot comparison

use image::{GenericImageView, Pixel, RgbaImage};
use railguide_common::ArtifactConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Result of a visual comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualDiff {
    /// Whether the images match (within threshold)
    pub matches: bool,

    /// Percentage of pixels that differ
    pub diff_percent: f64,

    pub diff_pixels: u64,

    /// Pixels in the union of both images
    pub total_pixels: u64,

    /// Path to the diff image (if generated)
    pub diff_image_path: Option<PathBuf>,

    pub actual_hash: String,
    pub baseline_hash: String,

    /// Baseline was created from this screenshot
    #[serde(default)]
    pub baseline_created: bool,
}

/// Per-pixel comparison of two decoded images
#[derive(Debug, Clone)]
pub struct PixelComparison {
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub diff_image: RgbaImage,
}

impl PixelComparison {
    pub fn diff_percent(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        (self.diff_pixels as f64 / self.total_pixels as f64) * 100.0
    }
}

/// Baseline screenshot store and comparator
pub struct VisualTester {
    baseline_dir: PathBuf,
    actual_dir: PathBuf,
    diff_dir: PathBuf,

    /// Default threshold (0.0 - 100.0 percent)
    threshold: f64,

    /// Per-channel difference still treated as equal
    channel_tolerance: u8,

    /// Create missing baselines from the actual screenshot
    auto_update: bool,
}

impl VisualTester {
    pub fn new(config: VisualConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.actual_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;

        Ok(Self {
            baseline_dir: config.baseline_dir,
            actual_dir: config.actual_dir,
            diff_dir: config.diff_dir,
            threshold: config.threshold,
            channel_tolerance: config.channel_tolerance,
            auto_update: config.auto_update,
        })
    }

    pub fn actual_path(&self, name: &str) -> PathBuf {
        self.actual_dir.join(format!("{}.png", name))
    }

    pub fn baseline_path(&self, name: &str) -> PathBuf {
        self.baseline_dir.join(format!("{}.png", name))
    }

    /// Compare a screenshot against its baseline
    pub fn compare(&self, name: &str, threshold: Option<f64>) -> E2eResult<VisualDiff> {
        let threshold = threshold.unwrap_or(self.threshold);

        let actual_path = self.actual_path(name);
        let baseline_path = self.baseline_path(name);

        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Actual screenshot not found: {}",
                actual_path.display()
            )));
        }

        if !baseline_path.exists() {
            if !self.auto_update {
                return Err(E2eError::BaselineNotFound(
                    baseline_path.to_string_lossy().to_string(),
                ));
            }
            info!("Creating baseline for '{}'", name);
            std::fs::copy(&actual_path, &baseline_path)?;

            let actual_hash = hash_file(&actual_path)?;
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: 0,
                diff_image_path: None,
                actual_hash: actual_hash.clone(),
                baseline_hash: actual_hash,
                baseline_created: true,
            });
        }

        let actual_hash = hash_file(&actual_path)?;
        let baseline_hash = hash_file(&baseline_path)?;

        if actual_hash == baseline_hash {
            debug!("Screenshot '{}' matches baseline exactly", name);
            let (w, h) = image::image_dimensions(&actual_path)?;
            return Ok(VisualDiff {
                matches: true,
                diff_percent: 0.0,
                diff_pixels: 0,
                total_pixels: w as u64 * h as u64,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
                baseline_created: false,
            });
        }

        let comparison = self.compare_files(&actual_path, &baseline_path)?;
        let diff_percent = comparison.diff_percent();
        let matches = diff_percent <= threshold;

        let diff_image_path = if comparison.diff_pixels > 0 {
            let path = self.diff_dir.join(format!("{}-diff.png", name));
            comparison.diff_image.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "Visual regression detected in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
                name, diff_percent, threshold
            );
        }

        Ok(VisualDiff {
            matches,
            diff_percent,
            diff_pixels: comparison.diff_pixels,
            total_pixels: comparison.total_pixels,
            diff_image_path,
            actual_hash,
            baseline_hash,
            baseline_created: false,
        })
    }

    /// Whether two screenshots differ by more than per-channel noise.
    /// Used for before/after pairs such as a theme toggle.
    pub fn images_differ(&self, a: &Path, b: &Path) -> E2eResult<bool> {
        if hash_file(a)? == hash_file(b)? {
            return Ok(false);
        }
        Ok(self.compare_files(a, b)?.diff_pixels > 0)
    }

    fn compare_files(&self, actual: &Path, baseline: &Path) -> E2eResult<PixelComparison> {
        let actual_img = image::open(actual)?;
        let baseline_img = image::open(baseline)?;

        if actual_img.dimensions() != baseline_img.dimensions() {
            warn!(
                "Screenshot dimensions differ: actual {:?} vs baseline {:?}",
                actual_img.dimensions(),
                baseline_img.dimensions()
            );
        }

        Ok(compare_pixels(
            &actual_img.to_rgba8(),
            &baseline_img.to_rgba8(),
            self.channel_tolerance,
        ))
    }

    /// Update the baseline with the actual screenshot
    pub fn update_baseline(&self, name: &str) -> E2eResult<()> {
        let actual_path = self.actual_path(name);
        if !actual_path.exists() {
            return Err(E2eError::VisualRegression(format!(
                "Cannot update baseline: actual screenshot not found: {}",
                actual_path.display()
            )));
        }

        std::fs::copy(&actual_path, self.baseline_path(name))?;
        info!("Updated baseline for '{}'", name);

        Ok(())
    }

    /// Promote every actual screenshot to baseline, returning the names
    pub fn update_all_baselines(&self) -> E2eResult<Vec<String>> {
        let names = png_stems(&self.actual_dir)?;
        for name in &names {
            self.update_baseline(name)?;
        }
        Ok(names)
    }

    pub fn list_baselines(&self) -> E2eResult<Vec<String>> {
        png_stems(&self.baseline_dir)
    }

    /// Remove diff images left by a previous run
    pub fn clean_diffs(&self) -> E2eResult<()> {
        for entry in std::fs::read_dir(&self.diff_dir)? {
            let path = entry?.path();
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Compare two images pixel by pixel. The union of both sizes is compared;
/// pixels present in only one image always count as different.
pub fn compare_pixels(actual: &RgbaImage, baseline: &RgbaImage, tolerance: u8) -> PixelComparison {
    let width = actual.width().max(baseline.width());
    let height = actual.height().max(baseline.height());
    let overlap_w = actual.width().min(baseline.width());
    let overlap_h = actual.height().min(baseline.height());

    let mut diff_image = RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 0, 255]));
    let mut diff_pixels = 0u64;
    let total_pixels = width as u64 * height as u64;

    for y in 0..overlap_h {
        for x in 0..overlap_w {
            let a = actual.get_pixel(x, y);
            let b = baseline.get_pixel(x, y);

            if pixels_differ(a, b, tolerance) {
                diff_pixels += 1;
            } else {
                let c = a.channels();
                diff_image.put_pixel(x, y, image::Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
            }
        }
    }

    let overlap = overlap_w as u64 * overlap_h as u64;
    diff_pixels += total_pixels - overlap;

    PixelComparison {
        diff_pixels,
        total_pixels,
        diff_image,
    }
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>, tolerance: u8) -> bool {
    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| x.abs_diff(*y) > tolerance)
}

fn hash_file(path: &Path) -> E2eResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn png_stems(dir: &Path) -> E2eResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "png").unwrap_or(false) {
            if let Some(stem) = path.file_stem() {
                names.push(stem.to_string_lossy().to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Configuration for visual testing
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub threshold: f64,
    pub channel_tolerance: u8,
    pub auto_update: bool,
}

impl VisualConfig {
    pub fn from_artifacts(artifacts: &ArtifactConfig, threshold: f64, channel_tolerance: u8) -> Self {
        Self {
            baseline_dir: artifacts.baseline_dir.clone(),
            actual_dir: artifacts.actual_dir.clone(),
            diff_dir: artifacts.diff_dir.clone(),
            threshold,
            channel_tolerance,
            auto_update: artifacts.update_baselines,
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("test-results/baselines"),
            actual_dir: PathBuf::from("test-results/screenshots"),
            diff_dir: PathBuf::from("test-results/diffs"),
            threshold: 20.0,
            channel_tolerance: 5,
            auto_update: false,
        }
    }
}
