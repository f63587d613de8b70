use divan::AllocProfiler;
use helm::{MonomerGraph, MonomerLibrary, Parser, Serializer, chain::decompose, transport};
use once_cell::sync::Lazy;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

const NOTATIONS: [&str; 6] = [
    "PEPTIDE1{A.A.A}$$$$",
    "PEPTIDE1{A.C.G.K.L.M.N.P.Q.R.S.T.V.W.Y}$PEPTIDE1,PEPTIDE1,15:R2-1:R1$$$",
    "RNA1{R(A)P.R(U)P.R(G)P.R(C)P.R(A)P.R(U)P.R(G)P.R(C)P}$$$$",
    "PEPTIDE1{A.(D.F)'20'.A}$$$$",
    "RNA1{R(A)P.R(C)P.R(G)}|RNA2{R(C)P.R(G)P.R(U)}$RNA1,RNA2,2:pair-8:pair|RNA1,RNA2,8:pair-2:pair$$$",
    "CHEM1{[SMCC]}|PEPTIDE1{A.C}|PEPTIDE2{G.K}$G1,CHEM1,?:R1-1:R1$G1(PEPTIDE1:0.5,PEPTIDE2:0.5)$$",
];

static LIBRARY: Lazy<MonomerLibrary> = Lazy::new(|| MonomerLibrary::embedded().unwrap());
static GRAPHS: Lazy<Vec<MonomerGraph>> = Lazy::new(|| {
    NOTATIONS
        .iter()
        .map(|notation| Parser::new(&*LIBRARY).parse(notation).unwrap())
        .collect()
});

fn main() {
    Lazy::force(&LIBRARY);
    Lazy::force(&GRAPHS);
    divan::main();
}

mod library {
    use super::*;

    #[divan::bench]
    fn load_embedded() -> MonomerLibrary {
        MonomerLibrary::embedded().unwrap()
    }
}

mod codec {
    use super::*;

    #[divan::bench(args = [0, 1, 2, 3, 4, 5])]
    fn parse(index: usize) -> MonomerGraph {
        Parser::new(&*LIBRARY).parse(NOTATIONS[index]).unwrap()
    }

    #[divan::bench(args = [0, 1, 2, 3, 4, 5])]
    fn serialize(index: usize) -> String {
        Serializer::new().serialize(&GRAPHS[index]).unwrap()
    }

    #[divan::bench(args = [0, 1, 2, 3, 4, 5])]
    fn decompose_chains(index: usize) -> usize {
        decompose(&GRAPHS[index]).chains.len()
    }

    #[divan::bench]
    fn compress_all() -> Vec<String> {
        NOTATIONS
            .iter()
            .map(|notation| transport::compress(notation).unwrap())
            .collect()
    }
}
