//! End-to-end tests against a running BookSwap backend.
//! Run with `--features system_tests`, the backend url is taken from `BOOKSWAP_API_URL`.
