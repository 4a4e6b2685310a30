//! Static vocabulary tables used for query expansion and concept matching.
//! Keys and values are lower-case; lookups lower-case the input first.

/// A read-only term → related-terms table.
pub type TermTable = &'static [(&'static str, &'static [&'static str])];

/// Synonyms and abbreviations for terms users commonly type.
pub static SYNONYMS: TermTable = &[
    ("bci", &["brain-computer interface", "brain-machine interface", "neural interface"]),
    ("brain-computer interface", &["bci", "brain-machine interface", "neural interface"]),
    ("eeg", &["electroencephalography", "brain signals"]),
    ("crispr", &["gene editing", "cas9", "genome editing"]),
    ("gene editing", &["crispr", "genome editing", "cas9"]),
    ("machine learning", &["deep learning", "neural network", "statistical learning"]),
    ("artificial intelligence", &["machine learning", "deep learning"]),
    ("deep learning", &["neural network", "representation learning"]),
    ("llm", &["large language model", "language model", "transformer"]),
    ("nlp", &["natural language processing", "language model"]),
    ("cancer", &["tumor", "oncology", "neoplasm"]),
    ("alzheimer", &["dementia", "neurodegeneration", "amyloid"]),
    ("protein folding", &["protein structure", "alphafold"]),
    ("single-cell", &["scrna-seq", "single cell sequencing"]),
];

/// Research concepts and the vocabulary that signals them.
pub static CONCEPTS: TermTable = &[
    ("neural decoding", &["decoding", "motor imagery", "spike", "eeg", "neural signal"]),
    ("neuroprosthetics", &["prosthe", "implant", "stimulation", "electrode"]),
    ("gene therapy", &["crispr", "cas9", "gene editing", "aav", "vector"]),
    ("machine learning", &["neural network", "deep learning", "classifier", "training", "transformer"]),
    ("genomics", &["genome", "sequencing", "variant", "gwas", "transcriptom"]),
    ("drug discovery", &["drug", "compound", "screening", "inhibitor", "binding"]),
    ("immunology", &["immune", "t cell", "antibody", "cytokine"]),
    ("neuroimaging", &["fmri", "mri", "imaging", "connectivity"]),
];
