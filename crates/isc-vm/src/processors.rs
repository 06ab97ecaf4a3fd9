//! Contract processors and the processor cache.
//!
//! A [`Processor`] exposes a contract's entry points. Native contracts are
//! described with [`ContractInterface`] and registered by program hash.
//! Other programs are stored as blobs: field `v` names the VM type, field
//! `p` holds the binary, and the [`VmTypeFactory`] registered for the VM
//! type turns the binary into a processor on first use.

use crate::core::blob;
use crate::sandbox::Sandbox;
use dashmap::DashMap;
use isc_crypto::keccak256;
use isc_storage::KvReader;
use isc_types::{hn, Dict, Hname, VmError, H256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name of the constructor entry point
pub const INIT: &str = "init";

/// Blob field holding the VM type of a program
pub const FIELD_VM_TYPE: &str = "v";
/// Blob field holding the program binary
pub const FIELD_PROGRAM: &str = "p";

/// Code of an entry point
pub type Handler = Arc<dyn Fn(&mut dyn Sandbox) -> Result<Dict, VmError> + Send + Sync>;

/// Callable entry point of a contract
#[derive(Clone)]
pub struct EntryPoint {
    name: String,
    view: bool,
    handler: Handler,
}

impl EntryPoint {
    /// Entry point that may change state
    pub fn func<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn Sandbox) -> Result<Dict, VmError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            view: false,
            handler: Arc::new(f),
        }
    }

    /// Read-only entry point
    pub fn view<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn Sandbox) -> Result<Dict, VmError> + Send + Sync + 'static,
    {
        Self {
            view: true,
            ..Self::func(name, f)
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a view
    pub fn is_view(&self) -> bool {
        self.view
    }

    /// Run the entry point
    pub fn call(&self, ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("view", &self.view)
            .finish()
    }
}

/// Executable form of a contract
pub trait Processor: Send + Sync {
    /// Entry point with the given hname
    fn entry_point(&self, hname: Hname) -> Option<EntryPoint>;
}

/// Native contract: a name plus a table of entry points.
///
/// A contract without an `init` entry point gets a no-op constructor.
#[derive(Clone, Debug)]
pub struct ContractInterface {
    name: String,
    description: String,
    entry_points: BTreeMap<Hname, EntryPoint>,
}

impl ContractInterface {
    /// Contract with no entry points
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            entry_points: BTreeMap::new(),
        }
    }

    /// Builder: add a state-changing entry point
    pub fn func<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn Sandbox) -> Result<Dict, VmError> + Send + Sync + 'static,
    {
        self.with_entry_point(EntryPoint::func(name, f))
    }

    /// Builder: add a view
    pub fn view<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut dyn Sandbox) -> Result<Dict, VmError> + Send + Sync + 'static,
    {
        self.with_entry_point(EntryPoint::view(name, f))
    }

    /// Builder: add an entry point
    pub fn with_entry_point(mut self, ep: EntryPoint) -> Self {
        self.entry_points.insert(hn(ep.name()), ep);
        self
    }

    /// Contract name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Contract hname
    pub fn hname(&self) -> Hname {
        hn(&self.name)
    }

    /// Description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Program hash under which the native processor is registered
    pub fn program_hash(&self) -> H256 {
        let mut data = b"native:".to_vec();
        data.extend_from_slice(self.name.as_bytes());
        keccak256(&data)
    }

    /// Entry points in hname order
    pub fn entry_points(&self) -> impl Iterator<Item = &EntryPoint> {
        self.entry_points.values()
    }
}

impl Processor for ContractInterface {
    fn entry_point(&self, hname: Hname) -> Option<EntryPoint> {
        if let Some(ep) = self.entry_points.get(&hname) {
            return Some(ep.clone());
        }
        (hname == hn(INIT)).then(|| EntryPoint::func(INIT, |_| Ok(Dict::new())))
    }
}

/// Builds processors for one VM type from program binaries
pub trait VmTypeFactory: Send + Sync {
    /// Processor for `program`
    fn new_processor(&self, program: &[u8]) -> Result<Arc<dyn Processor>, VmError>;
}

/// Program hash to processor, populated lazily and never invalidated
pub struct ProcessorCache {
    processors: DashMap<H256, Arc<dyn Processor>>,
    factories: DashMap<String, Arc<dyn VmTypeFactory>>,
}

impl ProcessorCache {
    /// Cache holding the core contracts
    pub fn new() -> Self {
        let cache = Self::empty();
        for iface in crate::core::core_contracts() {
            cache.register_native(iface);
        }
        cache
    }

    /// Cache holding nothing
    pub fn empty() -> Self {
        Self {
            processors: DashMap::new(),
            factories: DashMap::new(),
        }
    }

    /// Register a native contract; returns its program hash
    pub fn register_native(&self, iface: ContractInterface) -> H256 {
        let hash = iface.program_hash();
        debug!(contract = iface.name(), program_hash = %hash.short(), "registered native contract");
        self.processors.insert(hash, Arc::new(iface));
        hash
    }

    /// Register a factory for programs stored as blobs with `v == vm_type`
    pub fn register_vm_type(&self, vm_type: impl Into<String>, factory: Arc<dyn VmTypeFactory>) {
        self.factories.insert(vm_type.into(), factory);
    }

    /// Whether a processor is loaded for `program_hash`
    pub fn exists(&self, program_hash: &H256) -> bool {
        self.processors.contains_key(program_hash)
    }

    /// Number of loaded processors
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether nothing is loaded
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Processor for `program_hash`, loading it from the blob store in
    /// `state` (full chain state) if needed
    pub fn get_or_load(
        &self,
        program_hash: &H256,
        state: &dyn KvReader,
    ) -> Result<Arc<dyn Processor>, VmError> {
        if let Some(p) = self.processors.get(program_hash) {
            return Ok(p.value().clone());
        }
        let blobs = blob::partition(state);
        let vm_type = blob::get_field(&blobs, program_hash, FIELD_VM_TYPE).ok_or_else(|| {
            VmError::not_found(format!("program {} not found", program_hash.short()))
        })?;
        let vm_type = String::from_utf8(vm_type)
            .map_err(|_| VmError::invalid_params("vm type is not utf-8"))?;
        let program = blob::get_field(&blobs, program_hash, FIELD_PROGRAM).ok_or_else(|| {
            VmError::not_found(format!("program {} has no binary", program_hash.short()))
        })?;
        let factory = self
            .factories
            .get(&vm_type)
            .map(|f| f.value().clone())
            .ok_or_else(|| VmError::not_found(format!("unsupported vm type '{vm_type}'")))?;

        let processor = factory.new_processor(&program)?;
        debug!(program_hash = %program_hash.short(), %vm_type, "loaded processor");
        Ok(self
            .processors
            .entry(*program_hash)
            .or_insert(processor)
            .value()
            .clone())
    }
}

impl Default for ProcessorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorCache")
            .field("processors", &self.processors.len())
            .field("factories", &self.factories.len())
            .finish()
    }
}
