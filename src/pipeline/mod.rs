pub mod stage1_scores;
pub mod stage2_aggregate;
pub mod stage3_clusters;
pub mod stage4_figures;
pub mod stage5_assemble;
pub mod stage6_report;
