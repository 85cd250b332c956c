pub mod isolate;
pub mod links;
pub mod parked;
pub mod structured;

pub use isolate::isolate_legal_text;
pub use links::discover_legal_links;
pub use parked::is_parked;
pub use structured::extract_structured;
