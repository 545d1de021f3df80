// ============================================================================
// Domain Layer - Business Logic
// ============================================================================

pub mod tenant;
