pub mod aspect_ratio;
pub mod job_monitor;
pub mod name_allocator;
pub mod photo_service;
pub mod post_processor;
pub mod providers;
pub mod storage;
pub mod task_store;
