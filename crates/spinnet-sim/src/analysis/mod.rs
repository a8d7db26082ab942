pub mod conservation;
pub mod geometry;
pub mod statistics;

pub use conservation::{
    check_all, standard_laws, ConservationLaw, ConservationReport, Positivity, ProbabilityConservation,
    TotalOccupancy,
};
pub use geometry::{diffusion_rate, effective_dimension, GeometricProperties, GeometryCalculator};
pub use statistics::{
    analyze_history, find_important_nodes, kl_divergence, rate_of_change, ImportanceCriterion, StateStatistics,
};
