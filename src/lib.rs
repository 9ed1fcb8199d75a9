pub mod graph;
pub mod cust_error;
pub mod store;
pub mod reduction;
pub mod case_solve;
pub mod coloring;
pub mod brute;
