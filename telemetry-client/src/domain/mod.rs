pub mod device;
pub mod export_record;
pub mod reading;

pub use device::Device;
pub use export_record::{ExportRecord, NewExportRecord};
pub use reading::{NewReading, Reading};
