pub mod detection;
pub mod marker;
pub mod marker_filter;
pub mod marker_form;
pub mod marker_repository;
