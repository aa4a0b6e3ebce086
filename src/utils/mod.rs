pub mod student_cache;
