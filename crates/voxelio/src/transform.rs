//! Voxel/world affine transforms.
//!
//! A volume axis is described MINC-style: a signed `step`, a `start`
//! measured along the axis, and unit `direction_cosines`. NIfTI stores a
//! 4x4 affine instead (explicit sform rows, or a qform quaternion plus
//! voxel sizes); [`transform_to_minc`] converts such an affine back into
//! per-axis geometry so one container model serves both formats.

/// Row-major homogeneous matrix; the last row is always `[0, 0, 0, 1]`.
pub type Matrix4 = [[f64; 4]; 4];

pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Below this a determinant is treated as zero.
const SINGULAR_EPSILON: f64 = 1e-12;

/// World geometry of one spatial axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisGeometry {
    pub step: f64,
    pub start: f64,
    pub direction_cosines: [f64; 3],
}

impl AxisGeometry {
    pub fn new(step: f64, start: f64, direction_cosines: [f64; 3]) -> AxisGeometry {
        AxisGeometry {
            step,
            start,
            direction_cosines: normalize(direction_cosines),
        }
    }
}

/// Scale `v` to unit length. A zero vector is returned unchanged.
pub fn normalize(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm == 0.0 {
        return v;
    }
    [v[0] / norm, v[1] / norm, v[2] / norm]
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Voxel-to-world matrix for the x, y and z axes. Column `j` is axis `j`'s
/// cosines times its step; the translation is the world position of voxel
/// (0, 0, 0).
pub fn voxel_to_world_matrix(axes: &[AxisGeometry; 3]) -> Matrix4 {
    let mut m = IDENTITY;
    for (j, axis) in axes.iter().enumerate() {
        for r in 0..3 {
            m[r][j] = axis.direction_cosines[r] * axis.step;
            m[r][3] += axis.direction_cosines[r] * axis.start;
        }
    }
    m
}

/// Inverse of an affine matrix using the 3x3 adjugate. `None` when the
/// linear part is singular.
pub fn invert_affine(m: &Matrix4) -> Option<Matrix4> {
    let a = [
        [m[0][0], m[0][1], m[0][2]],
        [m[1][0], m[1][1], m[1][2]],
        [m[2][0], m[2][1], m[2][2]],
    ];
    let det = det3(&a);
    if det.abs() < SINGULAR_EPSILON {
        return None;
    }
    let inv = [
        [
            (a[1][1] * a[2][2] - a[1][2] * a[2][1]) / det,
            (a[0][2] * a[2][1] - a[0][1] * a[2][2]) / det,
            (a[0][1] * a[1][2] - a[0][2] * a[1][1]) / det,
        ],
        [
            (a[1][2] * a[2][0] - a[1][0] * a[2][2]) / det,
            (a[0][0] * a[2][2] - a[0][2] * a[2][0]) / det,
            (a[0][2] * a[1][0] - a[0][0] * a[1][2]) / det,
        ],
        [
            (a[1][0] * a[2][1] - a[1][1] * a[2][0]) / det,
            (a[0][1] * a[2][0] - a[0][0] * a[2][1]) / det,
            (a[0][0] * a[1][1] - a[0][1] * a[1][0]) / det,
        ],
    ];
    let mut out = IDENTITY;
    for r in 0..3 {
        out[r][..3].copy_from_slice(&inv[r]);
        out[r][3] = -(inv[r][0] * m[0][3] + inv[r][1] * m[1][3] + inv[r][2] * m[2][3]);
    }
    Some(out)
}

/// Apply an affine to a point.
pub fn apply(m: &Matrix4, p: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (r, o) in out.iter_mut().enumerate() {
        *o = m[r][0] * p[0] + m[r][1] * p[1] + m[r][2] * p[2] + m[r][3];
    }
    out
}

/// NIfTI qform: rotation from the quaternion `(b, c, d)`, scaled per
/// column by the voxel sizes in `pixdim[1..4]`. `pixdim[0]` is qfac; a
/// negative qfac flips the z column.
///
/// When `b² + c² + d²` reaches 1 the real part vanishes. The vector part
/// is then renormalised and `a` forced to 0, a 180 degree rotation.
#[allow(clippy::many_single_char_names)]
pub fn quaternion_to_matrix(quatern: [f64; 3], qoffset: [f64; 3], pixdim: [f64; 4]) -> Matrix4 {
    let [mut b, mut c, mut d] = quatern;
    let mut a = 1.0 - (b * b + c * c + d * d);
    if a < 1e-7 {
        let scale = 1.0 / (b * b + c * c + d * d).sqrt();
        b *= scale;
        c *= scale;
        d *= scale;
        a = 0.0;
    } else {
        a = a.sqrt();
    }

    let size = |s: f64| if s > 0.0 { s } else { 1.0 };
    let xd = size(pixdim[1]);
    let yd = size(pixdim[2]);
    let mut zd = size(pixdim[3]);
    if pixdim[0] < 0.0 {
        zd = -zd;
    }

    [
        [
            (a * a + b * b - c * c - d * d) * xd,
            2.0 * (b * c - a * d) * yd,
            2.0 * (b * d + a * c) * zd,
            qoffset[0],
        ],
        [
            2.0 * (b * c + a * d) * xd,
            (a * a + c * c - b * b - d * d) * yd,
            2.0 * (c * d - a * b) * zd,
            qoffset[1],
        ],
        [
            2.0 * (b * d - a * c) * xd,
            2.0 * (c * d + a * b) * yd,
            (a * a + d * d - c * c - b * b) * zd,
            qoffset[2],
        ],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Split an affine into MINC axis geometry.
///
/// Each column's length is the step magnitude. The step takes the sign of
/// the column's largest component, so the cosines always point along the
/// positive world axis they are closest to. Starts solve
/// `cosines · start = translation` by Cramer's rule. `None` when a column
/// is zero or the cosines are coplanar.
pub fn transform_to_minc(m: &Matrix4) -> Option<[AxisGeometry; 3]> {
    let mut steps = [0.0; 3];
    let mut cosines = [[0.0; 3]; 3];
    for j in 0..3 {
        let col = [m[0][j], m[1][j], m[2][j]];
        let magnitude = (col[0] * col[0] + col[1] * col[1] + col[2] * col[2]).sqrt();
        if magnitude == 0.0 || !magnitude.is_finite() {
            return None;
        }
        let dominant = (0..3)
            .max_by(|&p, &q| col[p].abs().total_cmp(&col[q].abs()))
            .unwrap_or(j);
        let step = if col[dominant] < 0.0 { -magnitude } else { magnitude };
        steps[j] = step;
        cosines[j] = [col[0] / step, col[1] / step, col[2] / step];
    }

    // Column j of the system matrix is axis j's cosines.
    let system = [
        [cosines[0][0], cosines[1][0], cosines[2][0]],
        [cosines[0][1], cosines[1][1], cosines[2][1]],
        [cosines[0][2], cosines[1][2], cosines[2][2]],
    ];
    let det = det3(&system);
    if det.abs() < SINGULAR_EPSILON {
        return None;
    }
    let t = [m[0][3], m[1][3], m[2][3]];
    let mut starts = [0.0; 3];
    for (j, start) in starts.iter_mut().enumerate() {
        let mut replaced = system;
        for r in 0..3 {
            replaced[r][j] = t[r];
        }
        *start = det3(&replaced) / det;
    }

    Some([0, 1, 2].map(|j| AxisGeometry {
        step: steps[j],
        start: starts[j],
        direction_cosines: cosines[j],
    }))
}
