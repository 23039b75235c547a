mod google_tests;
mod session_flow_tests;
