//! End-to-end tests against mock catalog servers

mod harvest_tests;
