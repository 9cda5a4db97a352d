/*!
 * Monitoring Module
 * Tracing setup and decision spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, DecisionSpan};
