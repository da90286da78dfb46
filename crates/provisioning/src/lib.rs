//! Work order provisioning.
//!
//! Provisioning turns a quotation into a work order with every required
//! material reserved against lots:
//! 1. Load the quotation and normalise its material requirements
//! 2. Create a provisional work order
//! 3. Allocate each requirement, newest lots first
//!
//! If any allocation fails, the reservations already made are released in
//! reverse order and the provisional work order is deleted.

pub mod coordinator;
pub mod error;
pub mod quotation;
pub mod requirements;
pub mod run;
pub mod work_order;

pub use coordinator::{ProvisionRequest, WorkOrderProvisioner};
pub use error::{ProvisioningError, Result};
pub use quotation::{NewQuotation, Quotation, QuotationStatus, Quotations};
pub use requirements::{RawRequirement, RequirementSource, normalize};
pub use run::{ProvisioningRun, ProvisioningState, ProvisioningStep, RunEvent};
pub use work_order::{AllocationRecord, WorkOrder, WorkOrderStatus};
