//! CSV batch driver: reads payment, refund and status rows and writes one outcome row each.

pub mod batch;
pub mod payment_reader;
pub mod result_writer;
