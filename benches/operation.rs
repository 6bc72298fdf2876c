#![feature(test)]
extern crate test;

use taskfarm::message::local;
use taskfarm::operation::batch;
use taskfarm::{Builtin, Group, Op, Operation};




#[bench]
fn reply_round_trip_to_self(b: &mut test::Bencher) {
    let comms = local::group(1);
    let group = Group::new(&comms[0]);
    let data: Vec<f64> = (0..1024).map(|n| n as f64).collect();

    b.iter(|| {
        let reply = group.source(0).irecv::<Vec<f64>>().unwrap();
        group.dest(0).send(&data).unwrap();
        reply.into_value().unwrap()
    });
}




#[bench]
fn request_round_trip_reusing_a_buffer(b: &mut test::Bencher) {
    let comms = local::group(1);
    let group = Group::new(&comms[0]);
    let data: Vec<f64> = (0..1024).map(|n| n as f64).collect();
    let mut buffer = Vec::with_capacity(1024);

    b.iter(|| {
        group.dest(0).send(&data).unwrap();
        group.source(0).irecv_into(&mut buffer).unwrap().wait().unwrap();
    });
}




#[bench]
fn test_some_over_a_mixed_batch(b: &mut test::Bencher) {
    let comms = local::group(1);
    let group = Group::new(&comms[0]);

    b.iter(|| {
        let mut words = group.source(0).irecv::<String>().unwrap();
        let mut count = group.source(0).with_tag(1).irecv::<u64>().unwrap();
        group.dest(0).with_tag(1).send(&7u64).unwrap();

        let mut ops: Vec<&mut dyn Operation> = vec![&mut words, &mut count];
        let done = batch::test_some(&mut ops).unwrap();
        words.cancel().unwrap();
        done
    });
}




#[bench]
fn all_reduce_over_four_ranks(b: &mut test::Bencher) {
    b.iter(|| {
        local::launch(4, |comm| {
            let group = Group::new(&comm);
            (0..100)
                .map(|n| group.all_reduce(&(n as u64), Op::builtin(Builtin::Sum)).unwrap())
                .sum::<u64>()
        })
    });
}
