//! Stochastic site-permutation search: simulated annealing over species
//! arrangements on a rigid crystal lattice, driven by an external energy oracle.

pub mod analysis;
pub mod core;
pub mod engine;
pub mod interface;
pub mod io;
pub mod solvers;
