//! The boundary between this crate and the host's physics/rendering engine.
//!
//! The core never owns rigid bodies, colliders, or audio playback; it only ever
//! talks to them through [`EngineAdapter`]. Skaters hold an opaque [`EntityHandle`],
//! never a long-lived reference into the engine, and every tick re-validates
//! [`EngineAdapter::entity_is_spawned`] before writing through it.

use nalgebra::{Point3, Rotation3, Vector3};

/// Opaque handle to an engine-side rigid body. Cheap to copy, carries no lifetime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct EntityHandle(pub u64);

/// Synchronous adapter the core drives every tick. All calls are expected to be
/// cheap and non-blocking; none of them are async, matching the single-threaded
/// cooperative tick discipline described in the concurrency model.
pub trait EngineAdapter {
    fn set_velocity(&mut self, entity: EntityHandle, v: Vector3<f32>);
    fn set_rotation(&mut self, entity: EntityHandle, rot: Rotation3<f32>);
    fn set_position(&mut self, entity: EntityHandle, pos: Point3<f32>);
    fn apply_impulse(&mut self, entity: EntityHandle, impulse: Vector3<f32>);
    fn apply_torque_impulse(&mut self, entity: EntityHandle, torque: Vector3<f32>);

    fn entity_is_spawned(&self, entity: EntityHandle) -> bool;
    fn get_linear_velocity(&self, entity: EntityHandle) -> Vector3<f32>;
    fn get_position(&self, entity: EntityHandle) -> Point3<f32>;

    /// Ground-sensor contact count; zero means airborne.
    fn ground_contacts(&self, entity: EntityHandle) -> u32;
    /// Wall-sensor contact count.
    fn wall_contacts(&self, entity: EntityHandle) -> u32;
}

/// Per-tick, per-player input record. Bit-packed the same way the teacher's client
/// protocol packs key state, plus the two analog fields the controller needs.
#[derive(Debug, Copy, Clone, Default)]
pub struct Intent {
    pub camera_yaw: f32,
    keys: u32,
}

const FORWARD: u32 = 0x1;
const BACK: u32 = 0x2;
const LEFT: u32 = 0x4;
const RIGHT: u32 = 0x8;
const SPRINT: u32 = 0x10;
const SPACE: u32 = 0x20;
const ROTATE: u32 = 0x40;
const PRIMARY: u32 = 0x80;
const SECONDARY: u32 = 0x100;

impl Intent {
    pub fn new(camera_yaw: f32) -> Self {
        Intent {
            camera_yaw,
            keys: 0,
        }
    }

    pub fn with_keys(camera_yaw: f32, keys: u32) -> Self {
        Intent { camera_yaw, keys }
    }

    pub fn forward(&self) -> bool {
        self.keys & FORWARD != 0
    }
    pub fn back(&self) -> bool {
        self.keys & BACK != 0
    }
    pub fn left(&self) -> bool {
        self.keys & LEFT != 0
    }
    pub fn right(&self) -> bool {
        self.keys & RIGHT != 0
    }
    pub fn sprint(&self) -> bool {
        self.keys & SPRINT != 0
    }
    pub fn space(&self) -> bool {
        self.keys & SPACE != 0
    }
    pub fn rotate(&self) -> bool {
        self.keys & ROTATE != 0
    }
    pub fn primary(&self) -> bool {
        self.keys & PRIMARY != 0
    }
    pub fn secondary(&self) -> bool {
        self.keys & SECONDARY != 0
    }

    pub fn set_forward(&mut self, v: bool) {
        self.set_bit(FORWARD, v)
    }
    pub fn set_back(&mut self, v: bool) {
        self.set_bit(BACK, v)
    }
    pub fn set_left(&mut self, v: bool) {
        self.set_bit(LEFT, v)
    }
    pub fn set_right(&mut self, v: bool) {
        self.set_bit(RIGHT, v)
    }
    pub fn set_sprint(&mut self, v: bool) {
        self.set_bit(SPRINT, v)
    }
    pub fn set_space(&mut self, v: bool) {
        self.set_bit(SPACE, v)
    }
    pub fn set_rotate(&mut self, v: bool) {
        self.set_bit(ROTATE, v)
    }
    pub fn set_primary(&mut self, v: bool) {
        self.set_bit(PRIMARY, v)
    }
    pub fn set_secondary(&mut self, v: bool) {
        self.set_bit(SECONDARY, v)
    }

    fn set_bit(&mut self, bit: u32, v: bool) {
        if v {
            self.keys |= bit;
        } else {
            self.keys &= !bit;
        }
    }

    /// Camera-relative movement direction in the XZ plane, unit length or zero if no
    /// movement keys are held.
    pub fn movement_direction(&self) -> Vector3<f32> {
        let mut local = Vector3::new(0.0, 0.0, 0.0);
        if self.forward() {
            local.z -= 1.0;
        }
        if self.back() {
            local.z += 1.0;
        }
        if self.left() {
            local.x -= 1.0;
        }
        if self.right() {
            local.x += 1.0;
        }
        if local.norm_squared() < 1e-9 {
            return local;
        }
        let local = local.normalize();
        let rot = Rotation3::from_axis_angle(&Vector3::y_axis(), self.camera_yaw);
        rot * local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_accessors_round_trip() {
        let mut intent = Intent::new(0.0);
        assert!(!intent.sprint());
        intent.set_sprint(true);
        assert!(intent.sprint());
        intent.set_sprint(false);
        assert!(!intent.sprint());
    }

    #[test]
    fn no_movement_keys_gives_zero_direction() {
        let intent = Intent::new(0.0);
        assert_eq!(intent.movement_direction(), Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn forward_at_zero_yaw_faces_negative_z() {
        let mut intent = Intent::new(0.0);
        intent.set_forward(true);
        let dir = intent.movement_direction();
        assert!(dir.z < 0.0);
        assert!(dir.x.abs() < 1e-6);
    }
}
