//! Frame and matrix helpers shared by the state sources, alignment and calibration.

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, SMatrix, UnitQuaternion, Vector3};

use crate::error::MomaError;

/// World "up"; gravity points along its negation.
pub const WORLD_UP: Vector3<f64> = Vector3::new(0.0, 0.0, 1.0);

/// Local "down" axis of the end-effector frame.
pub const EE_DOWN: Vector3<f64> = Vector3::new(0.0, 0.0, -1.0);

const MIN_QUATERNION_NORM: f64 = 1e-6;

/// Reshape a column-major flattened matrix, rejecting wrong lengths and
/// non-finite entries.
pub fn matrix_from_column_major<const R: usize, const C: usize>(
    values: &[f64],
    what: &str,
) -> Result<SMatrix<f64, R, C>, MomaError> {
    if values.len() != R * C {
        return Err(MomaError::Malformed(format!(
            "{what}: expected {} values, got {}",
            R * C,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MomaError::Malformed(format!("{what}: non-finite entry")));
    }
    Ok(SMatrix::<f64, R, C>::from_column_slice(values))
}

pub fn ensure_finite(values: &[f64], what: &str) -> Result<(), MomaError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(MomaError::Malformed(format!("{what}: non-finite entry")))
    }
}

pub fn rotation_block(t: &Matrix4<f64>) -> Matrix3<f64> {
    t.fixed_view::<3, 3>(0, 0).into_owned()
}

pub fn translation_block(t: &Matrix4<f64>) -> Vector3<f64> {
    t.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Rotation part of a homogeneous transform, taken as-is.
pub fn rotation_of(t: &Matrix4<f64>) -> Rotation3<f64> {
    Rotation3::from_matrix_unchecked(rotation_block(t))
}

pub fn homogeneous(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix4<f64> {
    let mut t = Matrix4::identity();
    t.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    t.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    t
}

/// World to body transform from an odometry pose. The quaternion is
/// `[x, y, z, w]` and is normalized before use.
pub fn pose_transform(position: &[f64; 3], orientation: &[f64; 4]) -> Result<Matrix4<f64>, MomaError> {
    ensure_finite(position, "odometry position")?;
    ensure_finite(orientation, "odometry orientation")?;
    let [x, y, z, w] = *orientation;
    let q = UnitQuaternion::try_new(Quaternion::new(w, x, y, z), MIN_QUATERNION_NORM)
        .ok_or_else(|| MomaError::Malformed("odometry orientation: zero quaternion".into()))?;
    let r = q.to_rotation_matrix();
    Ok(homogeneous(r.matrix(), &Vector3::from(*position)))
}

/// Projector onto the plane orthogonal to `v`.
pub fn ortho_projection(v: &Vector3<f64>) -> Matrix3<f64> {
    let n2 = v.norm_squared();
    if n2 == 0.0 {
        return Matrix3::identity();
    }
    Matrix3::identity() - (v * v.transpose()) / n2
}

/// `R·Rᵗ ≈ I` and `det(R) ≈ 1` within `tol`.
pub fn is_proper_rotation(r: &Matrix3<f64>, tol: f64) -> bool {
    let ortho = (r * r.transpose() - Matrix3::identity()).abs().max() <= tol;
    ortho && (r.determinant() - 1.0).abs() <= tol
}
