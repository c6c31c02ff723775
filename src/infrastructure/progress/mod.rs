mod in_memory_progress_tracker;

pub use in_memory_progress_tracker::InMemoryProgressTracker;
