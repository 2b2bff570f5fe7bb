//! Native call-graph replay engine.
//!
//! Recovers the field order and storage slots of FlatBuffers tables whose construction logic was
//! compiled to native code. For each table type:
//!
//! 1. the type's `Create{TypeName}` method is decoded and reduced to its call sites
//! 2. each call is classified against the builder lifecycle methods and the type's own methods
//!    ([`Classifier`])
//! 3. the calls are replayed through a small state machine bounded by the field count given to the
//!    object-start call ([`TableReplayer`])
//! 4. every accepted helper is decoded one level deeper to read the slot index baked into its
//!    field-write call ([`FieldSlotResolver`])
//! 5. helpers become [`fbs_types::FieldDescriptor`]s ordered by slot ([`FieldDeriver`])
//!
//! Nothing below the run level fails: per-type and per-field problems are carried as
//! [`fbs_types::Diagnostic`]s on the resulting [`fbs_types::TableDescriptor`].

pub mod address_index;
pub mod builder_api;
pub mod classifier;
pub mod fields;
pub mod replayer;
pub mod slot_resolver;
pub mod table;

pub use address_index::AddressIndex;
pub use builder_api::BuilderApi;
pub use classifier::{CallClass, Classifier};
pub use fields::{DerivedFields, FieldDeriver, FieldOptions};
pub use replayer::{ReplayState, TableReplayer, TableTrace};
pub use slot_resolver::{FieldSlotResolver, SlotError, SlotSource};
pub use table::{find_create_method, ReplayContext};
