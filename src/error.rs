use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! emission_error {
    ($context:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::EmissionFailure {
            context: $context.to_string(),
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The three failure classes of a weaving invocation map onto dedicated variants:
///
/// - [`Error::Malformed`] - the code blob or the symbol blob is not self-consistent
/// - [`Error::UnresolvedReference`] - a type or member referenced by the module could not be
///   located by the configured [`crate::resolution::ReferenceResolver`]
/// - [`Error::EmissionFailure`] - the (mutated) module graph can not be represented in the
///   binary format
///
/// All of them are final for the current invocation: nothing is retried and no partial output
/// is produced.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{Error, pipeline::{weave, CompiledModule}, resolution::RuntimeResolver};
/// use dotweave::weaver::{TimeOfDay, WeaveOptions};
///
/// let input = CompiledModule::new("Game", std::fs::read("Game.dll")?, std::fs::read("Game.pdb")?);
/// match weave(&input, TimeOfDay::now(), &RuntimeResolver::new(), &WeaveOptions::default()) {
///     Ok(output) => println!("woven {} method(s)", output.report.methods.len()),
///     Err(Error::Malformed { message, .. }) => eprintln!("broken input: {message}"),
///     Err(Error::UnresolvedReference { symbol, .. }) => eprintln!("missing: {symbol}"),
///     Err(e) => eprintln!("{e}"),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The code blob or the symbol blob is damaged and could not be parsed.
    ///
    /// Covers bad magic values, unsupported versions, streams or tables reaching outside of
    /// their blob, indexes into missing rows, and symbol entries that do not line up with the
    /// instructions of their method.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    ///
    /// Raised by the low-level [`crate::Parser`] and the `read_*_at` helpers. The module reader
    /// reports these as [`Error::Malformed`] once it knows which structure was being read.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A construct which is valid ECMA-335 but outside of what this crate handles.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// A reference of the module being read could not be resolved.
    ///
    /// `symbol` names the type or member as written in the module, `source` carries the
    /// failure reported by the resolution policy.
    #[error("Unresolved reference - {symbol}: {source}")]
    UnresolvedReference {
        /// Display name of the reference, e.g. `[System.Runtime]System.Console::WriteLine`
        symbol: String,
        /// The error returned by the resolver
        #[source]
        source: Box<Error>,
    },

    /// A resolution policy could not find the requested definition.
    #[error("Reference not found - {0}")]
    ReferenceNotFound(String),

    /// The module graph can not be serialized.
    ///
    /// `context` names the method, type or table that could not be written.
    #[error("Emission failed - {context}: {message}")]
    EmissionFailure {
        /// The element that failed to serialize
        context: String,
        /// What went wrong
        message: String,
    },

    /// A time-of-day value outside of `0..86400` seconds.
    #[error("Invalid time of day - {0} seconds since midnight")]
    InvalidTimeOfDay(u32),

    /// Recursion limit reached.
    ///
    /// The emulator bounds the depth of nested calls; this error reports the limit that was hit.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// The emulator hit an instruction or state it can not evaluate.
    #[error("Emulation failed - {0}")]
    EmulationFailure(String),
}

impl Error {
    /// Returns `true` for errors that indicate broken input data.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Malformed { .. } | Error::OutOfBounds { .. })
    }
}
