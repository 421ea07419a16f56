//! Parameter tree: named, typed, directional bindings.
//!
//! A module owns its values as [`Param`] handles and registers them under
//! a hierarchical path (`root/axis1/statusword`). The tree keeps a second
//! reference to the same slots, so external consumers (field bus link,
//! telemetry, tooling) read and write the live values without copying.
//!
//! Slots are lock-free `AtomicU64` cells. Reading or writing a slot from
//! the RT cycle never blocks and never allocates; only registration and
//! path lookup go through the tree's lock.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use thiserror::Error;

/// Value type stored in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Bool,
    I8,
    U16,
    I32,
    U32,
    F64,
}

/// Data flow direction of a binding, seen from the registering module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Fed from outside (bus link or another module); published to consumers.
    Input,
    /// Produced by the module; consumers may also override it.
    Output,
    /// Plain configuration constant.
    Tunable,
}

/// Errors raised by binding registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("binding '{0}' is already registered")]
    DuplicatePath(String),

    #[error("binding '{0}' not found")]
    NotFound(String),

    #[error("binding '{path}' holds {found:?}, requested {expected:?}")]
    TypeMismatch {
        path: String,
        expected: ParamType,
        found: ParamType,
    },

    #[error("binding '{path}' index {index} out of range (len {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Types that fit in a parameter slot.
pub trait ParamValue: Copy + Send + Sync + 'static {
    const TYPE: ParamType;
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

impl ParamValue for bool {
    const TYPE: ParamType = ParamType::Bool;
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
}

impl ParamValue for i8 {
    const TYPE: ParamType = ParamType::I8;
    fn to_bits(self) -> u64 {
        self as u8 as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits as u8 as i8
    }
}

impl ParamValue for u16 {
    const TYPE: ParamType = ParamType::U16;
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits as u16
    }
}

impl ParamValue for i32 {
    const TYPE: ParamType = ParamType::I32;
    fn to_bits(self) -> u64 {
        self as u32 as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits as u32 as i32
    }
}

impl ParamValue for u32 {
    const TYPE: ParamType = ParamType::U32;
    fn to_bits(self) -> u64 {
        self as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits as u32
    }
}

impl ParamValue for f64 {
    const TYPE: ParamType = ParamType::F64;
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

/// One untyped value cell.
#[derive(Debug)]
pub struct ParamSlot {
    bits: AtomicU64,
    ty: ParamType,
}

impl ParamSlot {
    fn new<T: ParamValue>(value: T) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
            ty: T::TYPE,
        }
    }

    #[inline]
    pub fn param_type(&self) -> ParamType {
        self.ty
    }

    #[inline]
    fn load_bits(&self) -> u64 {
        self.bits.load(Ordering::Relaxed)
    }

    #[inline]
    fn store_bits(&self, bits: u64) {
        self.bits.store(bits, Ordering::Relaxed);
    }
}

/// Shared slot storage as held by the tree.
pub type ParamRef = Arc<[ParamSlot]>;

/// Typed handle to one value or a fixed-length array of values.
///
/// Cloning the handle shares the slots.
#[derive(Debug)]
pub struct Param<T: ParamValue> {
    slots: ParamRef,
    _ty: PhantomData<fn() -> T>,
}

impl<T: ParamValue> Clone for Param<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            _ty: PhantomData,
        }
    }
}

impl<T: ParamValue> Param<T> {
    /// Single value.
    pub fn scalar(value: T) -> Self {
        Self::array(1, value)
    }

    /// `len` values, all initialised to `value`.
    pub fn array(len: usize, value: T) -> Self {
        Self {
            slots: (0..len).map(|_| ParamSlot::new(value)).collect(),
            _ty: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value at `index`.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    #[inline]
    pub fn get(&self, index: usize) -> T {
        T::from_bits(self.slots[index].load_bits())
    }

    /// Store `value` at `index`.
    ///
    /// # Panics
    /// Panics if `index >= len()`.
    #[inline]
    pub fn set(&self, index: usize, value: T) {
        self.slots[index].store_bits(value.to_bits());
    }

    /// First value (scalar bindings).
    #[inline]
    pub fn value(&self) -> T {
        self.get(0)
    }

    /// Store the first value (scalar bindings).
    #[inline]
    pub fn store(&self, value: T) {
        self.set(0, value);
    }

    fn slots(&self) -> ParamRef {
        Arc::clone(&self.slots)
    }
}

/// Registration capability consumed by modules.
pub trait BindingRegistry: Send + Sync {
    /// Register `slots` of type `param_type` under `path`. Paths are unique;
    /// zero-length arrays are allowed.
    fn register(
        &self,
        path: &str,
        direction: Direction,
        param_type: ParamType,
        slots: ParamRef,
    ) -> Result<(), BindingError>;
}

/// Registered binding as seen by consumers.
#[derive(Debug, Clone)]
struct Binding {
    direction: Direction,
    param_type: ParamType,
    slots: ParamRef,
}

/// Description of one binding, for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub path: String,
    pub direction: Direction,
    pub param_type: ParamType,
    pub len: usize,
}

/// In-process binding registry.
#[derive(Debug, Default)]
pub struct ParameterTree {
    bindings: RwLock<BTreeMap<String, Binding>>,
}

impl ParameterTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered bindings.
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.bindings.read().contains_key(path)
    }

    /// Describe the binding at `path`.
    pub fn info(&self, path: &str) -> Result<BindingInfo, BindingError> {
        let bindings = self.bindings.read();
        let binding = bindings
            .get(path)
            .ok_or_else(|| BindingError::NotFound(path.to_string()))?;
        Ok(BindingInfo {
            path: path.to_string(),
            direction: binding.direction,
            param_type: binding.param_type,
            len: binding.slots.len(),
        })
    }

    /// All bindings, sorted by path.
    pub fn list(&self) -> Vec<BindingInfo> {
        self.bindings
            .read()
            .iter()
            .map(|(path, b)| BindingInfo {
                path: path.clone(),
                direction: b.direction,
                param_type: b.param_type,
                len: b.slots.len(),
            })
            .collect()
    }

    /// Read element `index` of the binding at `path`.
    pub fn get<T: ParamValue>(&self, path: &str, index: usize) -> Result<T, BindingError> {
        let slots = self.lookup::<T>(path, index)?;
        Ok(T::from_bits(slots[index].load_bits()))
    }

    /// Write element `index` of the binding at `path`.
    pub fn set<T: ParamValue>(&self, path: &str, index: usize, value: T) -> Result<(), BindingError> {
        let slots = self.lookup::<T>(path, index)?;
        slots[index].store_bits(value.to_bits());
        Ok(())
    }

    fn lookup<T: ParamValue>(&self, path: &str, index: usize) -> Result<ParamRef, BindingError> {
        let bindings = self.bindings.read();
        let binding = bindings
            .get(path)
            .ok_or_else(|| BindingError::NotFound(path.to_string()))?;
        let found = binding.param_type;
        if found != T::TYPE {
            return Err(BindingError::TypeMismatch {
                path: path.to_string(),
                expected: T::TYPE,
                found,
            });
        }
        if index >= binding.slots.len() {
            return Err(BindingError::IndexOutOfRange {
                path: path.to_string(),
                index,
                len: binding.slots.len(),
            });
        }
        Ok(Arc::clone(&binding.slots))
    }
}

impl BindingRegistry for ParameterTree {
    fn register(
        &self,
        path: &str,
        direction: Direction,
        param_type: ParamType,
        slots: ParamRef,
    ) -> Result<(), BindingError> {
        let mut bindings = self.bindings.write();
        if bindings.contains_key(path) {
            return Err(BindingError::DuplicatePath(path.to_string()));
        }
        bindings.insert(
            path.to_string(),
            Binding {
                direction,
                param_type,
                slots,
            },
        );
        Ok(())
    }
}

/// A module's view of the registry: a path prefix plus the shared registry.
#[derive(Clone)]
pub struct BindingScope {
    registry: Arc<dyn BindingRegistry>,
    path: String,
}

impl BindingScope {
    /// Top-level scope named `name`.
    pub fn root(registry: Arc<dyn BindingRegistry>, name: &str) -> Self {
        Self {
            registry,
            path: name.to_string(),
        }
    }

    /// Scope of a submodule.
    pub fn child(&self, name: &str) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            path: format!("{}/{name}", self.path),
        }
    }

    /// Full path of this scope.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Full path of a binding named `name` in this scope.
    pub fn binding_path(&self, name: &str) -> String {
        format!("{}/{name}", self.path)
    }

    /// Register `param` as `<scope>/<name>`.
    pub fn register<T: ParamValue>(
        &self,
        name: &str,
        direction: Direction,
        param: &Param<T>,
    ) -> Result<(), BindingError> {
        self.registry
            .register(&self.binding_path(name), direction, T::TYPE, param.slots())
    }
}

impl core::fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BindingScope").field("path", &self.path).finish()
    }
}
