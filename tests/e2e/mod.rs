mod fetch_sequences;
mod matrix_quality;
mod shipped_config;
