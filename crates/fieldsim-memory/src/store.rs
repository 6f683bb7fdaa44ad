//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Tag memory shared by every field device module."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::collections::HashMap;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::{MemoryError, Result};

/// Map state guarded by the internal reader-writer lock.
#[derive(Debug, Default)]
struct Maps {
    // tag name -> IO module id
    external_binary: HashMap<String, String>,
    external_analog: HashMap<String, String>,

    // IO module id -> device name
    binary_modules: HashMap<String, String>,
    analog_modules: HashMap<String, String>,

    // tag name -> queued output value, destined for the simulator
    pending_binary: HashMap<String, bool>,
    pending_analog: HashMap<String, f64>,

    // tag name -> stored value (internal datastores)
    internal_binary: HashMap<String, bool>,
    internal_analog: HashMap<String, f64>,
    internal_string: HashMap<String, String>,

    // device name -> current reading (external datastores)
    device_binary: HashMap<String, bool>,
    device_analog: HashMap<String, f64>,

    // Shadow buffers; present exactly while a freeze is in effect.
    shadow: Option<Shadow>,
}

/// Buffers that absorb writes arriving during a freeze.
#[derive(Debug, Default)]
struct Shadow {
    pending_binary: HashMap<String, bool>,
    pending_analog: HashMap<String, f64>,
    internal_binary: HashMap<String, bool>,
    internal_analog: HashMap<String, f64>,
    internal_string: HashMap<String, String>,
}

/// Result of materializing one kind-namespace for the logic evaluator.
///
/// External tags that fail to resolve are reported in `errors` while the
/// rest of the snapshot is still returned.
#[derive(Debug, Default)]
pub struct Snapshot<T> {
    /// tag name -> resolved value.
    pub points: HashMap<String, T>,
    /// Resolution failures for tags missing from `points`.
    pub errors: Vec<MemoryError>,
}

/// The typed, multi-namespace tag store.
///
/// The embedded `exclusive` mutex is deliberately separate from the map
/// lock: callers hold it across several operations (a register write batch,
/// the cycle output flush) without starving readers of individual tags.
#[derive(Debug, Default)]
pub struct TagMemory {
    maps: RwLock<Maps>,
    exclusive: Mutex<()>,
}

impl TagMemory {
    /// Create an empty memory; configuration populates it afterwards.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the caller-facing exclusive lock.
    ///
    /// Held by the output flush and by Modbus write handlers so a batch of
    /// tag updates is seen atomically by the next drain.
    pub fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.exclusive.lock()
    }

    // --- configuration population ---------------------------------------

    /// Bind an external binary tag to an IO module id.
    pub fn register_external_binary(&self, tag: impl Into<String>, module: impl Into<String>) {
        self.maps.write().external_binary.insert(tag.into(), module.into());
    }

    /// Bind an external analog tag to an IO module id.
    pub fn register_external_analog(&self, tag: impl Into<String>, module: impl Into<String>) {
        self.maps.write().external_analog.insert(tag.into(), module.into());
    }

    /// Create an internal binary tag with its initial status.
    pub fn register_internal_binary(&self, tag: impl Into<String>, status: bool) {
        self.maps.write().internal_binary.insert(tag.into(), status);
    }

    /// Create an internal analog tag with its initial value.
    pub fn register_internal_analog(&self, tag: impl Into<String>, value: f64) {
        self.maps.write().internal_analog.insert(tag.into(), value);
    }

    /// Create an internal string tag with its initial text.
    pub fn register_internal_string(&self, tag: impl Into<String>, value: impl Into<String>) {
        self.maps.write().internal_string.insert(tag.into(), value.into());
    }

    /// Bind a binary IO module id to a simulator device name.
    pub fn add_binary_module(&self, module: impl Into<String>, device: impl Into<String>) {
        self.maps.write().binary_modules.insert(module.into(), device.into());
    }

    /// Bind an analog IO module id to a simulator device name.
    pub fn add_analog_module(&self, module: impl Into<String>, device: impl Into<String>) {
        self.maps.write().analog_modules.insert(module.into(), device.into());
    }

    /// Register a binary device point, initially false.
    pub fn add_binary_device(&self, device: impl Into<String>) {
        self.maps.write().device_binary.insert(device.into(), false);
    }

    /// Register an analog device point, initially 0.0.
    pub fn add_analog_device(&self, device: impl Into<String>) {
        self.maps.write().device_analog.insert(device.into(), 0.0);
    }

    // --- tag reads -------------------------------------------------------

    /// True when the name exists in any of the five tag namespaces.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.maps.read().has_tag(tag)
    }

    /// Current status of a binary tag; external tags resolve through their
    /// IO module to the device namespace.
    pub fn binary_status(&self, tag: &str) -> Result<bool> {
        self.maps.read().binary_status(tag)
    }

    /// Current value of an analog tag; external tags resolve through their
    /// IO module to the device namespace.
    pub fn analog_value(&self, tag: &str) -> Result<f64> {
        self.maps.read().analog_value(tag)
    }

    /// Current text of a string tag. String tags are internal only, so no
    /// module traversal takes place.
    pub fn string_value(&self, tag: &str) -> Result<String> {
        let maps = self.maps.read();
        maps.internal_string
            .get(tag)
            .cloned()
            .ok_or_else(|| MemoryError::UnknownTag(tag.to_owned()))
    }

    // --- tag writes ------------------------------------------------------

    /// Write a binary tag. External tags queue the status for the next
    /// output drain; internal tags update the internal store. During a
    /// freeze the write lands in the shadow buffers instead.
    pub fn update_binary(&self, tag: &str, status: bool) -> Result<()> {
        let mut maps = self.maps.write();
        let maps = &mut *maps;

        if maps.external_binary.contains_key(tag) {
            match maps.shadow.as_mut() {
                Some(shadow) => shadow.pending_binary.insert(tag.to_owned(), status),
                None => maps.pending_binary.insert(tag.to_owned(), status),
            };
            return Ok(());
        }

        if maps.internal_binary.contains_key(tag) {
            match maps.shadow.as_mut() {
                Some(shadow) => shadow.internal_binary.insert(tag.to_owned(), status),
                None => maps.internal_binary.insert(tag.to_owned(), status),
            };
            return Ok(());
        }

        if maps.has_tag(tag) {
            return Err(MemoryError::WrongKind(tag.to_owned(), "binary"));
        }

        Err(MemoryError::UnknownTag(tag.to_owned()))
    }

    /// Write an analog tag; same routing rules as [`update_binary`].
    ///
    /// [`update_binary`]: TagMemory::update_binary
    pub fn update_analog(&self, tag: &str, value: f64) -> Result<()> {
        let mut maps = self.maps.write();
        let maps = &mut *maps;

        if maps.external_analog.contains_key(tag) {
            match maps.shadow.as_mut() {
                Some(shadow) => shadow.pending_analog.insert(tag.to_owned(), value),
                None => maps.pending_analog.insert(tag.to_owned(), value),
            };
            return Ok(());
        }

        if maps.internal_analog.contains_key(tag) {
            match maps.shadow.as_mut() {
                Some(shadow) => shadow.internal_analog.insert(tag.to_owned(), value),
                None => maps.internal_analog.insert(tag.to_owned(), value),
            };
            return Ok(());
        }

        if maps.has_tag(tag) {
            return Err(MemoryError::WrongKind(tag.to_owned(), "analog"));
        }

        Err(MemoryError::UnknownTag(tag.to_owned()))
    }

    /// Write a string tag. Applies to internal strings only.
    pub fn update_string(&self, tag: &str, value: &str) -> Result<()> {
        let mut maps = self.maps.write();
        let maps = &mut *maps;

        if maps.internal_string.contains_key(tag) {
            match maps.shadow.as_mut() {
                Some(shadow) => shadow.internal_string.insert(tag.to_owned(), value.to_owned()),
                None => maps.internal_string.insert(tag.to_owned(), value.to_owned()),
            };
            return Ok(());
        }

        if maps.has_tag(tag) {
            return Err(MemoryError::WrongKind(tag.to_owned(), "string"));
        }

        Err(MemoryError::UnknownTag(tag.to_owned()))
    }

    // --- device namespace (simulation plane) -----------------------------

    /// Inbound simulator update for a binary device point.
    pub fn set_binary_device(&self, device: &str, status: bool) -> Result<()> {
        let mut maps = self.maps.write();
        match maps.device_binary.get_mut(device) {
            Some(slot) => {
                *slot = status;
                Ok(())
            }
            None => Err(MemoryError::UnknownDevice(device.to_owned())),
        }
    }

    /// Inbound simulator update for an analog device point.
    pub fn set_analog_device(&self, device: &str, value: f64) -> Result<()> {
        let mut maps = self.maps.write();
        match maps.device_analog.get_mut(device) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MemoryError::UnknownDevice(device.to_owned())),
        }
    }

    /// True when the name is a registered binary device point.
    pub fn is_binary_device(&self, device: &str) -> bool {
        self.maps.read().device_binary.contains_key(device)
    }

    /// True when the name is a registered analog device point.
    pub fn is_analog_device(&self, device: &str) -> bool {
        self.maps.read().device_analog.contains_key(device)
    }

    /// Current reading for a binary device point, if registered.
    pub fn binary_device_status(&self, device: &str) -> Option<bool> {
        self.maps.read().device_binary.get(device).copied()
    }

    /// Current reading for an analog device point, if registered.
    pub fn analog_device_value(&self, device: &str) -> Option<f64> {
        self.maps.read().device_analog.get(device).copied()
    }

    /// Union of binary and analog device names; these are the subscription
    /// targets on the simulation plane.
    pub fn device_points(&self) -> Vec<String> {
        let maps = self.maps.read();
        let mut points: Vec<String> = maps.device_binary.keys().cloned().collect();
        points.extend(maps.device_analog.keys().cloned());
        points
    }

    // --- output drains ---------------------------------------------------

    /// Drain queued binary outputs through `apply`.
    ///
    /// Entries whose queued status equals the current device reading are
    /// suppressed and cleared. A successful `apply` commits the new reading
    /// to the device namespace and clears the entry; a failed `apply`
    /// retains the entry. When several applications fail, the last error
    /// observed is returned.
    pub fn drain_binary_outputs<E>(
        &self,
        mut apply: impl FnMut(&str, bool) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        let mut maps = self.maps.write();
        let maps = &mut *maps;
        let queued: Vec<(String, bool)> =
            maps.pending_binary.iter().map(|(t, v)| (t.clone(), *v)).collect();

        let mut drain_err = None;

        for (tag, status) in queued {
            let Some(module) = maps.external_binary.get(&tag) else {
                continue;
            };
            let Some(device) = maps.binary_modules.get(module).cloned() else {
                continue;
            };
            let Ok(current) = maps.binary_status(&tag) else {
                continue;
            };

            if status == current {
                maps.pending_binary.remove(&tag);
                continue;
            }

            match apply(&device, status) {
                Ok(()) => {
                    maps.device_binary.insert(device, status);
                    maps.pending_binary.remove(&tag);
                }
                Err(err) => drain_err = Some(err),
            }
        }

        match drain_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drain queued analog outputs through `apply`; semantics as
    /// [`drain_binary_outputs`].
    ///
    /// [`drain_binary_outputs`]: TagMemory::drain_binary_outputs
    pub fn drain_analog_outputs<E>(
        &self,
        mut apply: impl FnMut(&str, f64) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        let mut maps = self.maps.write();
        let maps = &mut *maps;
        let queued: Vec<(String, f64)> =
            maps.pending_analog.iter().map(|(t, v)| (t.clone(), *v)).collect();

        let mut drain_err = None;

        for (tag, value) in queued {
            let Some(module) = maps.external_analog.get(&tag) else {
                continue;
            };
            let Some(device) = maps.analog_modules.get(module).cloned() else {
                continue;
            };
            let Ok(current) = maps.analog_value(&tag) else {
                continue;
            };

            if value == current {
                maps.pending_analog.remove(&tag);
                continue;
            }

            match apply(&device, value) {
                Ok(()) => {
                    maps.device_analog.insert(device, value);
                    maps.pending_analog.remove(&tag);
                }
                Err(err) => drain_err = Some(err),
            }
        }

        match drain_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // --- freeze / thaw ---------------------------------------------------

    /// Begin a freeze: subsequent writes land in shadow buffers and readers
    /// keep seeing pre-freeze values. Waits on the exclusive lock so an
    /// in-flight write batch is never bisected.
    pub fn freeze(&self) -> Result<()> {
        let _batch = self.exclusive.lock();
        let mut maps = self.maps.write();

        if maps.shadow.is_some() {
            return Err(MemoryError::AlreadyFrozen);
        }

        maps.shadow = Some(Shadow::default());
        Ok(())
    }

    /// End a freeze: merge every shadow buffer into its primary map.
    /// Merging is last-writer-wins per name with no ordering between keys.
    pub fn unfreeze(&self) -> Result<()> {
        let _batch = self.exclusive.lock();
        let mut maps = self.maps.write();

        let Some(shadow) = maps.shadow.take() else {
            return Err(MemoryError::NotFrozen);
        };

        maps.pending_binary.extend(shadow.pending_binary);
        maps.pending_analog.extend(shadow.pending_analog);
        maps.internal_binary.extend(shadow.internal_binary);
        maps.internal_analog.extend(shadow.internal_analog);
        maps.internal_string.extend(shadow.internal_string);

        Ok(())
    }

    // --- snapshots -------------------------------------------------------

    /// Resolved external binary tags plus internal binary tags, for the
    /// logic evaluator.
    pub fn snapshot_binary(&self) -> Snapshot<bool> {
        let maps = self.maps.read();
        let mut snapshot = Snapshot::default();

        for tag in maps.external_binary.keys() {
            match maps.binary_status(tag) {
                Ok(status) => {
                    snapshot.points.insert(tag.clone(), status);
                }
                Err(err) => snapshot.errors.push(err),
            }
        }

        for (tag, status) in &maps.internal_binary {
            snapshot.points.insert(tag.clone(), *status);
        }

        snapshot
    }

    /// Resolved external analog tags plus internal analog tags, for the
    /// logic evaluator.
    pub fn snapshot_analog(&self) -> Snapshot<f64> {
        let maps = self.maps.read();
        let mut snapshot = Snapshot::default();

        for tag in maps.external_analog.keys() {
            match maps.analog_value(tag) {
                Ok(value) => {
                    snapshot.points.insert(tag.clone(), value);
                }
                Err(err) => snapshot.errors.push(err),
            }
        }

        for (tag, value) in &maps.internal_analog {
            snapshot.points.insert(tag.clone(), *value);
        }

        snapshot
    }
}

impl Maps {
    fn has_tag(&self, tag: &str) -> bool {
        self.external_binary.contains_key(tag)
            || self.external_analog.contains_key(tag)
            || self.internal_binary.contains_key(tag)
            || self.internal_analog.contains_key(tag)
            || self.internal_string.contains_key(tag)
    }

    fn binary_status(&self, tag: &str) -> Result<bool> {
        if let Some(module) = self.external_binary.get(tag) {
            let device = self
                .binary_modules
                .get(module)
                .ok_or_else(|| MemoryError::UnboundModule(tag.to_owned()))?;

            return self
                .device_binary
                .get(device)
                .copied()
                .ok_or_else(|| MemoryError::UnboundModule(tag.to_owned()));
        }

        self.internal_binary
            .get(tag)
            .copied()
            .ok_or_else(|| MemoryError::UnknownTag(tag.to_owned()))
    }

    fn analog_value(&self, tag: &str) -> Result<f64> {
        if let Some(module) = self.external_analog.get(tag) {
            let device = self
                .analog_modules
                .get(module)
                .ok_or_else(|| MemoryError::UnboundModule(tag.to_owned()))?;

            return self
                .device_analog
                .get(device)
                .copied()
                .ok_or_else(|| MemoryError::UnboundModule(tag.to_owned()));
        }

        self.internal_analog
            .get(tag)
            .copied()
            .ok_or_else(|| MemoryError::UnknownTag(tag.to_owned()))
    }
}
