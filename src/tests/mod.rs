//! End-to-end tests: the full browser flow against a mocked remote API.
