//! Parser and cross-referencing engine for decompiled device-tree sources.
//!
//! The text produced by `dtc -I dtb -O dts` is parsed into an arena-backed [`Tree`],
//! which can be searched by name or property, re-rendered, and analyzed for the
//! use of every GPIO line: GPIO specifiers, interrupt routing and pinctrl groups.
//!
//! ```
//! use dts_xref::Analyzer;
//!
//! let tree = dts_xref::from_str(
//!     r#"/ { compatible = "qcom,demo"; pinctrl@1000 { phandle = <0x5>; grp { pins = "gpio24"; }; }; dev { pinctrl-0 = <0x5>; }; };"#,
//! )?;
//! let report = Analyzer::new(&tree).report()?;
//!
//! assert!(report.to_string().contains("24:\npinctrl:\n\tdev -> grp\n"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod ast;
mod error;
mod parser;

pub mod platform;
pub mod report;
pub mod resolve;
pub mod search;
pub mod tree;
pub mod usage;

pub use error::{AnalysisError, ParseError, TreeError};
pub use parser::{from_str, parse, ParseOptions};
pub use platform::Platform;
pub use report::Report;
pub use resolve::Resolver;
pub use search::Pattern;
pub use tree::{NodeId, Tree};
pub use usage::Analyzer;
