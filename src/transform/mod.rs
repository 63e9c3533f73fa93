pub mod flatten;
pub mod sheet;

pub use flatten::{flatten_event, flatten_events};
pub use sheet::{build_sheet, build_sheets, compare_lines, PlayerPropSheet};
