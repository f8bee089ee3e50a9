use crate::{
    classifier::Classifier,
    domain::{EnrichedTransaction, TransactionRecord},
    enricher::Enricher,
};

/// Classify, then enrich the survivors concurrently.
#[derive(Clone)]
pub struct TransactionPipeline {
    classifier: Classifier,
    enricher: Enricher,
}

impl TransactionPipeline {
    pub fn new(classifier: Classifier, enricher: Enricher) -> Self {
        Self {
            classifier,
            enricher,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub async fn process(&self, transactions: &[TransactionRecord]) -> Vec<EnrichedTransaction> {
        let food = self.classifier.filter(transactions);
        if food.is_empty() {
            return Vec::new();
        }
        self.enricher.enrich_all(food).await
    }
}
