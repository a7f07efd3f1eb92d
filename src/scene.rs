//! Scene/camera collaborator contract
//!
//! The 3D framework hosting the client implements this trait. The client only
//! reads camera transforms and presentation flags from it, and toggles the
//! placeholder content shown while no remote video is available.

use crate::math::Mat4;

/// Access to the hosting scene and its camera
pub trait Scene: Send + Sync {
    /// Current camera world transform (row-major 4x4)
    fn camera_world_transform(&self) -> Mat4;

    /// Left/right eye world transforms while presenting in stereo
    fn stereo_camera_transforms(&self) -> Option<(Mat4, Mat4)>;

    /// Whether an immersive stereo presentation is currently active
    fn immersive_presentation_active(&self) -> bool;

    /// Whether the scene is in VR mode
    fn is_vr_mode(&self) -> bool;

    /// Whether the scene is in AR mode
    fn is_ar_mode(&self) -> bool;

    /// Show or hide the locally rendered placeholder content
    fn set_placeholder_visible(&self, visible: bool);
}
