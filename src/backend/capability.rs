//! Dynamic capability binding
//!
//! libdrm and libgbm are opened at runtime instead of being linked, so the
//! compositor starts on machines without them and can fall back to another
//! backend. A capability set either resolves every entry point it needs or
//! is unavailable as a whole; a half-bound table never escapes.

use std::fmt;

use libloading::Library;
use log::{info, warn};

/// Errors from binding a capability set
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("Could not open '{library}': {source}")]
    Open {
        library: String,
        #[source]
        source: libloading::Error,
    },
    #[error("Could not load function '{symbol}' from '{library}' ({set})")]
    MissingSymbol {
        set: &'static str,
        library: String,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
}

/// A named table of entry points resolved from one shared library
pub trait CapabilitySet: Sized {
    /// Short name used in diagnostics
    const NAME: &'static str;

    /// Resolve every entry point. The table keeps `library` open for as
    /// long as it lives.
    fn resolve(library: Library, library_name: &str) -> Result<Self, CapabilityError>;
}

/// Resolve one entry point from `library`.
///
/// # Safety
///
/// `T` must be the exact function pointer type of the symbol, and the
/// returned pointer must not outlive `library`.
pub unsafe fn symbol<T: Copy>(
    library: &Library,
    set: &'static str,
    library_name: &str,
    name: &'static str,
) -> Result<T, CapabilityError> {
    match library.get::<T>(name.as_bytes()) {
        Ok(sym) => Ok(*sym),
        Err(source) => Err(CapabilityError::MissingSymbol {
            set,
            library: library_name.to_string(),
            symbol: name,
            source,
        }),
    }
}

/// A capability set that was probed at startup
pub enum Capability<T> {
    Available(T),
    Unavailable(CapabilityError),
}

impl<T: CapabilitySet> Capability<T> {
    /// Open `library_name` and resolve the set from it
    pub fn bind(library_name: &str) -> Self {
        // Safety: loading runs the library's initialisers; libdrm and libgbm
        // have no unsound ones.
        let library = match unsafe { Library::new(library_name) } {
            Ok(library) => library,
            Err(source) => {
                let error = CapabilityError::Open {
                    library: library_name.to_string(),
                    source,
                };
                warn!("{} unavailable: {}", T::NAME, error);
                return Capability::Unavailable(error);
            }
        };

        match T::resolve(library, library_name) {
            Ok(set) => {
                info!("Bound {} from {}", T::NAME, library_name);
                Capability::Available(set)
            }
            Err(error) => {
                warn!("{} unavailable: {}", T::NAME, error);
                Capability::Unavailable(error)
            }
        }
    }
}

impl<T> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    /// Treat an unavailable set as an error
    pub fn into_result(self) -> Result<T, CapabilityError> {
        match self {
            Capability::Available(set) => Ok(set),
            Capability::Unavailable(error) => Err(error),
        }
    }
}

impl<T> fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable(e) => f.debug_tuple("Unavailable").field(e).finish(),
        }
    }
}
