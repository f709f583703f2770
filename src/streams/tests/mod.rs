mod manager_tests;
mod record_tests;
