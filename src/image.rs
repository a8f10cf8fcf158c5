//! Statistical images
//!
//! A [`StatImage`] is a 3D scalar volume with a voxel-to-MNI affine. Images are
//! loaded from NIfTI (`.nii`, `.nii.gz`) or from a JSON volume description used
//! for synthetic maps:
//!
//! ```json
//! { "shape": [nx, ny, nz], "affine": [[..4..], [..4..], [..4..], [0, 0, 0, 1]], "data": [...] }
//! ```
//!
//! JSON data is flattened with x varying fastest, matching the NIfTI layout.

use std::fs;
use std::path::Path;

use ndarray::{Array3, ShapeBuilder};
use nifti::{NiftiHeader, NiftiObject, RandomAccessNiftiVolume, ReaderOptions};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// 4x4 voxel-to-world matrix, row major
pub type Affine = [[f64; 4]; 4];

/// Immutable 3D statistical volume
#[derive(Debug, Clone, PartialEq)]
pub struct StatImage {
    data: Array3<f64>,
    affine: Affine,
    inverse: [[f64; 3]; 3],
}

#[derive(Debug, Serialize, Deserialize)]
struct StatImageFile {
    shape: [usize; 3],
    affine: Affine,
    data: Vec<f64>,
}

impl StatImage {
    /// Create an image, rejecting singular affines
    pub fn new(data: Array3<f64>, affine: Affine) -> Result<Self, ReportError> {
        let linear = linear_part(&affine);
        let inverse = invert3(&linear).ok_or_else(|| {
            ReportError::InvalidImage("affine has a singular rotation/zoom block".to_string())
        })?;
        if affine.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ReportError::InvalidImage(
                "affine contains non-finite values".to_string(),
            ));
        }
        Ok(Self {
            data,
            affine,
            inverse,
        })
    }

    /// Load from `.nii`, `.nii.gz` or `.json`
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let name = path.to_string_lossy();
        if name.ends_with(".json") {
            let content = fs::read_to_string(path)?;
            Self::from_json(&content).map_err(|e| ReportError::ImageLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        } else {
            load_nifti(path)
        }
    }

    /// Parse a JSON volume description
    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        let file: StatImageFile = serde_json::from_str(json)?;
        let [nx, ny, nz] = file.shape;
        let data = Array3::from_shape_vec((nx, ny, nz).f(), file.data).map_err(|e| {
            ReportError::InvalidImage(format!("data does not match shape {:?}: {}", file.shape, e))
        })?;
        Self::new(data, file.affine)
    }

    /// Serialize to the JSON volume description
    pub fn to_json(&self) -> Result<String, ReportError> {
        let (nx, ny, nz) = self.data.dim();
        let file = StatImageFile {
            shape: [nx, ny, nz],
            affine: self.affine,
            data: self.data.t().iter().copied().collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Volume of one voxel in mm^3
    pub fn voxel_volume(&self) -> f64 {
        det3(&linear_part(&self.affine)).abs()
    }

    /// MNI coordinate of a voxel centre
    pub fn voxel_to_mm(&self, voxel: [usize; 3]) -> [f64; 3] {
        let v = [voxel[0] as f64, voxel[1] as f64, voxel[2] as f64];
        let mut out = [0.0; 3];
        for (row, o) in out.iter_mut().enumerate() {
            let a = &self.affine[row];
            *o = a[0] * v[0] + a[1] * v[1] + a[2] * v[2] + a[3];
        }
        out
    }

    /// Nearest voxel to an MNI coordinate, if it lies inside the volume
    pub fn mm_to_voxel(&self, mm: [f64; 3]) -> Option<[usize; 3]> {
        let shifted = [
            mm[0] - self.affine[0][3],
            mm[1] - self.affine[1][3],
            mm[2] - self.affine[2][3],
        ];
        let (nx, ny, nz) = self.shape();
        let dims = [nx, ny, nz];
        let mut voxel = [0usize; 3];
        for axis in 0..3 {
            let r = &self.inverse[axis];
            let idx = (r[0] * shifted[0] + r[1] * shifted[1] + r[2] * shifted[2]).round();
            if !idx.is_finite() || idx < 0.0 || idx >= dims[axis] as f64 {
                return None;
            }
            voxel[axis] = idx as usize;
        }
        Some(voxel)
    }

    /// Value at a voxel
    pub fn value(&self, voxel: [usize; 3]) -> Option<f64> {
        self.data.get(voxel).copied()
    }
}

fn load_nifti(path: &Path) -> Result<StatImage, ReportError> {
    let load_err = |message: String| ReportError::ImageLoad {
        path: path.to_path_buf(),
        message,
    };

    let obj = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| load_err(e.to_string()))?;
    let header = obj.header().clone();

    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(load_err(format!("expected at least 3D volume, got {}D", ndim)));
    }
    let nx = header.dim[1] as usize;
    let ny = header.dim[2] as usize;
    let nz = header.dim[3] as usize;

    let volume = obj.into_volume();
    let mut data = Array3::<f64>::zeros((nx, ny, nz));
    // Higher dimensions are pinned to their first index
    let mut coords = vec![0u16; ndim];
    for ((i, j, k), value) in data.indexed_iter_mut() {
        coords[0] = i as u16;
        coords[1] = j as u16;
        coords[2] = k as u16;
        *value = volume
            .get_f64(&coords)
            .map_err(|e| load_err(e.to_string()))?;
    }

    tracing::debug!(path = %path.display(), nx, ny, nz, "loaded nifti volume");
    StatImage::new(data, header_affine(&header))
}

/// Affine from the sform when present, otherwise a voxel-size diagonal
fn header_affine(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        [
            row(&header.srow_x),
            row(&header.srow_y),
            row(&header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        let vs = |i: usize| {
            let v = header.pixdim[i] as f64;
            if v == 0.0 {
                1.0
            } else {
                v
            }
        };
        [
            [vs(1), 0.0, 0.0, 0.0],
            [0.0, vs(2), 0.0, 0.0],
            [0.0, 0.0, vs(3), 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

fn linear_part(affine: &Affine) -> [[f64; 3]; 3] {
    [
        [affine[0][0], affine[0][1], affine[0][2]],
        [affine[1][0], affine[1][1], affine[1][2]],
        [affine[2][0], affine[2][1], affine[2][2]],
    ]
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn invert3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let det = det3(m);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}
