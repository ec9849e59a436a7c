//! Scanner capability and the registry that resolves configured scanners.
//!
//! Scanners are statically linked: built-in implementations and any
//! application-supplied extensions register a [`ScannerFactory`] up front,
//! and capability conformance is enforced by the trait system at
//! registration time rather than per run. Resolution or instantiation
//! failures are fatal for the whole session; there is no partial-scanner
//! tolerance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use trellis_broker::{BrokerError, MarketScreen};
use trellis_config::{ScannerKind, ScannerSpec};
use trellis_core::Symbol;

mod momentum;

pub use momentum::{MomentumParams, MomentumScanner};

/// Result alias used within scanner implementations.
pub type ScanResult<T> = Result<T, ScannerError>;

#[derive(Debug, Error)]
pub enum ScannerError {
    /// The configured name resolves to no registered factory.
    #[error("unknown {kind:?} scanner '{name}'")]
    Unknown { name: String, kind: ScannerKind },
    /// A factory with the same name was already registered.
    #[error("scanner factory '{0}' is already registered")]
    Duplicate(String),
    /// Required parameter missing or value out of range.
    #[error("invalid parameters for scanner '{name}': {reason}")]
    InvalidParams { name: String, reason: String },
    /// The screening collaborator failed.
    #[error("scanner data error: {0}")]
    Data(#[from] BrokerError),
}

/// A component that inspects market conditions and proposes a symbol list.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Human-friendly identifier used in logs.
    fn name(&self) -> &str;

    /// Whether the scanner should be re-run periodically during the session.
    fn recurrence(&self) -> bool {
        false
    }

    /// Produce candidate symbols, most interesting first.
    async fn run(&self) -> ScanResult<Vec<Symbol>>;
}

impl std::fmt::Debug for dyn Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("name", &self.name())
            .finish()
    }
}

/// Builds a [`Scanner`] from its configured spec and the screening handle.
pub trait ScannerFactory: Send + Sync {
    fn name(&self) -> &str;

    fn build(
        &self,
        spec: &ScannerSpec,
        screen: Arc<dyn MarketScreen>,
    ) -> ScanResult<Box<dyn Scanner>>;
}

/// Registry of statically-linked scanner factories, keyed by name.
pub struct ScannerRegistry {
    factories: HashMap<String, Box<dyn ScannerFactory>>,
}

impl ScannerRegistry {
    /// An empty registry with no factories.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry pre-populated with the built-in scanners.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Box::new(momentum::MomentumFactory))
            .expect("builtin registration cannot collide in an empty registry");
        registry
    }

    /// Register an additional factory; duplicate names are rejected.
    pub fn register(&mut self, factory: Box<dyn ScannerFactory>) -> ScanResult<()> {
        let name = factory.name().to_string();
        if self.factories.contains_key(&name) {
            return Err(ScannerError::Duplicate(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a configured spec into a scanner instance. Both builtin and
    /// custom kinds resolve through the same table; only the error message
    /// distinguishes them.
    pub fn resolve(
        &self,
        spec: &ScannerSpec,
        screen: Arc<dyn MarketScreen>,
    ) -> ScanResult<Box<dyn Scanner>> {
        let factory = self
            .factories
            .get(&spec.name)
            .ok_or_else(|| ScannerError::Unknown {
                name: spec.name.clone(),
                kind: spec.kind,
            })?;
        factory.build(spec, screen)
    }

    /// Instantiate and run every configured scanner in order, concatenating
    /// their outputs. The first failure aborts the whole scan.
    pub async fn run_all(
        &self,
        specs: &[ScannerSpec],
        screen: Arc<dyn MarketScreen>,
    ) -> ScanResult<Vec<Symbol>> {
        let mut symbols = Vec::new();
        for spec in specs {
            let scanner = self.resolve(spec, screen.clone())?;
            info!(scanner = scanner.name(), recurrence = scanner.recurrence(), "running scanner");
            let mut found = scanner.run().await?;
            info!(scanner = scanner.name(), candidates = found.len(), "scanner finished");
            symbols.append(&mut found);
        }
        Ok(symbols)
    }

    /// Names of all registered factories, for diagnostics.
    pub fn registered(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
