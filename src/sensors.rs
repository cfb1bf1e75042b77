//! Head tracker backed by the NDK rotation sensors.
//!
//! Prefers the Game Rotation Vector (no magnetometer drift); falls back to
//! integrating the raw gyroscope.

use std::ptr;
use std::time::Duration;
use glam::{EulerRot, Quat, Vec3};
use log::{info, warn};

use crate::vr::{HeadPose, HeadTracker};

const ASENSOR_TYPE_GAME_ROTATION_VECTOR: i32 = 15;
const ASENSOR_TYPE_GYROSCOPE: i32 = 4;
// 60 Hz
const EVENT_RATE_US: i32 = 16_000;

pub struct SensorHeadTracker {
    sensor_manager: *mut ndk_sys::ASensorManager,
    sensor: *const ndk_sys::ASensor,
    event_queue: *mut ndk_sys::ASensorEventQueue,
    looper: *mut ndk_sys::ALooper,

    orientation: Quat,
    // Accumulated gyroscope rotation
    pitch: f32,
    yaw: f32,
    roll: f32,
    last_timestamp: Option<Duration>,

    initialized: bool,
    paused: bool,
}

impl SensorHeadTracker {
    pub fn new() -> Self {
        let mut tracker = Self {
            sensor_manager: ptr::null_mut(),
            sensor: ptr::null(),
            event_queue: ptr::null_mut(),
            looper: ptr::null_mut(),
            orientation: Quat::IDENTITY,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            last_timestamp: None,
            initialized: false,
            paused: false,
        };
        tracker.init_sensors();
        tracker
    }

    fn init_sensors(&mut self) {
        info!("SensorHeadTracker: initializing rotation sensors");

        unsafe {
            self.sensor_manager =
                ndk_sys::ASensorManager_getInstanceForPackage(b"com.stereoplayer\0".as_ptr().cast());
            if self.sensor_manager.is_null() {
                self.sensor_manager = ndk_sys::ASensorManager_getInstance();
            }
            if self.sensor_manager.is_null() {
                warn!("SensorHeadTracker: ASensorManager not available");
                return;
            }

            let mut sensor = ndk_sys::ASensorManager_getDefaultSensor(
                self.sensor_manager,
                ASENSOR_TYPE_GAME_ROTATION_VECTOR,
            );
            if sensor.is_null() {
                info!("SensorHeadTracker: no game rotation vector, trying gyroscope");
                sensor = ndk_sys::ASensorManager_getDefaultSensor(self.sensor_manager, ASENSOR_TYPE_GYROSCOPE);
            }
            if sensor.is_null() {
                warn!("SensorHeadTracker: no rotation sensors");
                return;
            }
            self.sensor = sensor;

            self.looper = ndk_sys::ALooper_forThread();
            if self.looper.is_null() {
                self.looper = ndk_sys::ALooper_prepare(0);
            }
            if self.looper.is_null() {
                warn!("SensorHeadTracker: no ALooper for this thread");
                return;
            }

            self.event_queue = ndk_sys::ASensorManager_createEventQueue(
                self.sensor_manager,
                self.looper,
                0,
                None,
                ptr::null_mut(),
            );
            if self.event_queue.is_null() {
                warn!("SensorHeadTracker: failed to create event queue");
                return;
            }
        }

        self.initialized = self.enable();
        if self.initialized {
            info!("SensorHeadTracker: sensors enabled");
        }
    }

    fn enable(&mut self) -> bool {
        if self.event_queue.is_null() || self.sensor.is_null() {
            return false;
        }
        unsafe {
            let result = ndk_sys::ASensorEventQueue_enableSensor(self.event_queue, self.sensor);
            if result < 0 {
                warn!("SensorHeadTracker: enableSensor failed: {}", result);
                return false;
            }
            ndk_sys::ASensorEventQueue_setEventRate(self.event_queue, self.sensor, EVENT_RATE_US);
        }
        true
    }

    fn disable(&mut self) {
        if self.event_queue.is_null() || self.sensor.is_null() {
            return;
        }
        unsafe {
            ndk_sys::ASensorEventQueue_disableSensor(self.event_queue, self.sensor);
        }
    }

    pub fn is_available(&self) -> bool {
        self.initialized
    }

    /// Drains pending sensor events into `orientation`.
    fn poll(&mut self, dt: f32) {
        unsafe {
            let mut event: ndk_sys::ASensorEvent = std::mem::zeroed();
            while ndk_sys::ASensorEventQueue_getEvents(self.event_queue, &mut event, 1) > 0 {
                let data = event.__bindgen_anon_1.__bindgen_anon_1.data;
                match event.type_ {
                    ASENSOR_TYPE_GAME_ROTATION_VECTOR => {
                        let (x, y, z) = (data[0], data[1], data[2]);
                        let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
                        self.orientation = Quat::from_xyzw(x, y, z, w).normalize();
                    }
                    ASENSOR_TYPE_GYROSCOPE => {
                        self.pitch += data[0] * dt;
                        self.yaw += data[2] * dt;
                        self.roll += data[1] * dt;
                        self.orientation = Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, self.roll);
                    }
                    _ => {}
                }
            }
        }
    }
}

impl HeadTracker for SensorHeadTracker {
    fn pose(&mut self, timestamp: Duration) -> HeadPose {
        if self.initialized && !self.paused {
            let dt = self
                .last_timestamp
                .map(|last| timestamp.saturating_sub(last).as_secs_f32())
                .unwrap_or(0.0);
            self.poll(dt);
        }
        self.last_timestamp = Some(timestamp);
        HeadPose {
            position: Vec3::ZERO,
            orientation: self.orientation,
        }
    }

    fn pause(&mut self) {
        if !self.paused {
            self.disable();
            self.paused = true;
        }
    }

    fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.last_timestamp = None;
            if self.initialized {
                self.enable();
            }
        }
    }
}

impl Drop for SensorHeadTracker {
    fn drop(&mut self) {
        self.disable();
        unsafe {
            if !self.event_queue.is_null() && !self.sensor_manager.is_null() {
                ndk_sys::ASensorManager_destroyEventQueue(self.sensor_manager, self.event_queue);
            }
        }
    }
}
