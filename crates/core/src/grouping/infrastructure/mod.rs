pub mod pearson_scorer;
