pub mod similarity_scorer;
